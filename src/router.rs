use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    response::Redirect,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use chrono_tz::Tz;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::db::PollsStorage;
use crate::error::PollsError;
use crate::handlers::{accounts, admin, polls};
use crate::middleware::allowed_hosts::enforce_allowed_hosts;
use crate::templates::Templates;

/// Form posts are tiny; anything larger is rejected with 413.
pub const FORM_BODY_LIMIT: usize = 64 * 1024;

/// Runtime settings derived once from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub allowed_hosts: Vec<String>,
    pub debug: bool,
    pub timezone: Tz,
    pub secure_cookies: bool,
    pub static_root: PathBuf,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Result<Self, PollsError> {
        Ok(Self {
            allowed_hosts: cfg.allowed_hosts(),
            debug: cfg.basic.debug,
            timezone: cfg.timezone()?,
            secure_cookies: !cfg.security.insecure_cookie,
            static_root: cfg.basic.static_root.clone(),
        })
    }
}

#[derive(Clone)]
pub struct PollsState {
    pub storage: PollsStorage,
    pub templates: Arc<Templates>,
    pub settings: Arc<Settings>,
    /// Keyed on the socket peer address, shared by login and signup.
    pub login_limiter: Arc<DefaultKeyedRateLimiter<String>>,
    key: Key,
}

impl PollsState {
    pub fn new(storage: PollsStorage, cfg: &Config) -> Result<Self, PollsError> {
        let per_minute = NonZeroU32::new(cfg.security.login_rate_per_minute).ok_or_else(|| {
            PollsError::Config("LOGIN_RATE_PER_MINUTE must be at least 1".to_string())
        })?;
        Ok(Self {
            storage,
            templates: Arc::new(Templates::new()?),
            settings: Arc::new(Settings::from_config(cfg)?),
            login_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            key: cfg.cookie_key(),
        })
    }

    /// False once `peer` has used up its login/signup attempts for now.
    pub fn allow_login_attempt(&self, peer: &str) -> bool {
        self.login_limiter.check_key(&peer.to_string()).is_ok()
    }
}

impl FromRef<PollsState> for Key {
    fn from_ref(state: &PollsState) -> Self {
        state.key.clone()
    }
}

pub fn polls_router(state: PollsState) -> Router {
    let static_files = ServeDir::new(&state.settings.static_root);

    Router::new()
        .route("/", get(|| async { Redirect::permanent("/polls/") }))
        .route("/polls/", get(polls::index))
        .route("/polls/{id}/", get(polls::detail))
        .route("/polls/{id}/results/", get(polls::results))
        .route("/polls/{id}/vote/", post(polls::vote))
        .route(
            "/accounts/login/",
            get(accounts::login_page).post(accounts::login),
        )
        .route("/accounts/logout/", post(accounts::logout))
        .route("/signup/", get(accounts::signup_page).post(accounts::signup))
        .nest("/admin", admin::admin_router())
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(FORM_BODY_LIMIT))
        .layer(from_fn_with_state(state.clone(), enforce_allowed_hosts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
