use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use tera::Context;
use tracing::{info, warn};

use crate::error::PollsError;
use crate::handlers::render_page;
use crate::middleware::client_ip::{ClientIp, PeerIp};
use crate::middleware::flash::Level;
use crate::middleware::session::Session;
use crate::router::PollsState;
use crate::service::accounts::{RegisterError, Registration, authenticate, register};
use crate::types::forms::{LoginForm, NextQuery, SignupForm, safe_next};

const BAD_CREDENTIALS: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

fn login_context(next: &str, username: &str, error_message: Option<&str>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("next", next);
    ctx.insert("username", username);
    ctx.insert("error_message", &error_message);
    ctx
}

fn signup_context(username: &str, errors: &[String]) -> Context {
    let mut ctx = Context::new();
    ctx.insert("username", username);
    ctx.insert("errors", errors);
    ctx
}

/// GET /accounts/login/
pub async fn login_page(
    State(state): State<PollsState>,
    Query(query): Query<NextQuery>,
    session: Session,
) -> Result<Response, PollsError> {
    let next = safe_next(query.next.as_deref());
    if session.user().is_some() {
        return Ok(Redirect::to(next).into_response());
    }
    render_page(
        &state,
        session,
        "registration/login.html",
        login_context(next, "", None),
    )
}

/// POST /accounts/login/
pub async fn login(
    State(state): State<PollsState>,
    ClientIp(ip): ClientIp,
    PeerIp(peer): PeerIp,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, PollsError> {
    if !state.allow_login_attempt(&peer) {
        warn!(ip = %ip, peer = %peer, "login attempts throttled");
        return Err(PollsError::RateLimited);
    }
    let next = safe_next(form.next.as_deref());

    match authenticate(&state.storage, form.username.trim(), &form.password).await? {
        Some(user) => {
            info!("{} logged in from {}", user.username, ip);
            let session = session.login(user);
            Ok((session, Redirect::to(next)).into_response())
        }
        None => {
            warn!("Failed login for {} from {}", form.username, ip);
            render_page(
                &state,
                session,
                "registration/login.html",
                login_context(next, &form.username, Some(BAD_CREDENTIALS)),
            )
        }
    }
}

/// POST /accounts/logout/
pub async fn logout(ClientIp(ip): ClientIp, session: Session) -> impl IntoResponse {
    if let Some(user) = session.user() {
        info!("{} logged out from {}", user.username, ip);
    }
    (session.logout(), Redirect::to("/polls/"))
}

/// GET /signup/
pub async fn signup_page(
    State(state): State<PollsState>,
    session: Session,
) -> Result<Response, PollsError> {
    render_page(
        &state,
        session,
        "registration/signup.html",
        signup_context("", &[]),
    )
}

/// POST /signup/ -> create the account and log straight in.
pub async fn signup(
    State(state): State<PollsState>,
    ClientIp(ip): ClientIp,
    PeerIp(peer): PeerIp,
    session: Session,
    Form(form): Form<SignupForm>,
) -> Result<Response, PollsError> {
    if !state.allow_login_attempt(&peer) {
        warn!(ip = %ip, peer = %peer, "signup attempts throttled");
        return Err(PollsError::RateLimited);
    }

    let registration = Registration {
        username: form.username,
        password1: form.password1,
        password2: form.password2,
    };
    match register(&state.storage, &registration).await {
        Ok(id) => {
            let user = state
                .storage
                .get_user(id)
                .await?
                .ok_or(PollsError::NotFound("User"))?;
            info!("{} signed up and logged in from {}", user.username, ip);
            let session = session
                .login(user)
                .flash(Level::Success, "Registration successful. You are now logged in.");
            Ok((session, Redirect::to("/polls/")).into_response())
        }
        Err(RegisterError::Invalid(errors)) => {
            let session = session.flash(Level::Error, "Registration failed.");
            render_page(
                &state,
                session,
                "registration/signup.html",
                signup_context(registration.username.trim(), &errors),
            )
        }
        Err(RegisterError::Internal(e)) => Err(e),
    }
}
