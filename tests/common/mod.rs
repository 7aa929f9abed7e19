#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use chrono::{Duration, Utc};
use polls::config::Config;
use polls::db::PollsStorage;
use polls::db::sqlite::{NewUser, QuestionDraft};
use polls::service::accounts::hash_password;
use polls::{PollsState, polls_router};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "s3cret-pass";

pub struct TestApp {
    pub app: Router,
    pub storage: PollsStorage,
    _dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Fresh migrated sqlite file per test; `tweak` adjusts config before the state is built.
pub async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let database_url = format!("sqlite:{}", dir.path().join("polls.sqlite3").display());

    let mut cfg = Config::default();
    cfg.basic.database_url = database_url.clone();
    cfg.basic.static_root = dir.path().join("staticfiles");
    cfg.security.allowed_hosts = "*".to_string();
    cfg.security.insecure_cookie = true;
    cfg.security.secret_key = Some("test-secret-key-".repeat(4));
    tweak(&mut cfg);

    let pool = polls::db::connect(&database_url)
        .await
        .expect("failed to open database");
    let storage = PollsStorage::new(pool);
    storage.migrate().await.expect("migrations failed");

    let state = PollsState::new(storage.clone(), &cfg).expect("failed to build state");
    TestApp {
        app: polls_router(state),
        storage,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut req = Request::builder().method("GET").uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.app
            .clone()
            .oneshot(req.body(Body::empty()).expect("failed to build request"))
            .await
            .expect("request failed")
    }

    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.app
            .clone()
            .oneshot(
                req.body(Body::from(body.to_string()))
                    .expect("failed to build request"),
            )
            .await
            .expect("request failed")
    }

    pub async fn send_json(
        &self,
        method: &str,
        uri: &str,
        json: Option<serde_json::Value>,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        let body = match json {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        self.app
            .clone()
            .oneshot(req.body(body).expect("failed to build request"))
            .await
            .expect("request failed")
    }

    /// Log in through the form and return the resulting `Cookie` header.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let body = format!("username={username}&password={password}");
        let resp = self.post_form("/accounts/login/", &body, None).await;
        assert_eq!(resp.status(), 303, "login for {username} failed");
        merge_cookies("", &resp)
    }

    pub async fn create_user(&self, username: &str, is_staff: bool) -> i64 {
        self.storage
            .create_user(&NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: hash_password(PASSWORD).expect("hash failed"),
                is_staff,
                is_superuser: false,
            })
            .await
            .expect("failed to create user")
    }

    /// Question published `days` from now (negative is the past).
    pub async fn create_question(
        &self,
        text: &str,
        days: i64,
        end_days: Option<i64>,
        choices: &[&str],
    ) -> i64 {
        let now = Utc::now();
        let draft = QuestionDraft {
            question_text: text.to_string(),
            pub_date: now + Duration::days(days),
            end_date: end_days.map(|d| now + Duration::days(d)),
        };
        let choices: Vec<String> = choices.iter().map(|c| c.to_string()).collect();
        self.storage
            .insert_question(&draft, &choices)
            .await
            .expect("failed to insert question")
    }
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    String::from_utf8(bytes.to_vec()).expect("response body was not utf-8")
}

pub fn location(resp: &Response<Body>) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("response has no Location header")
}

/// Apply a response's `Set-Cookie` headers to a `Cookie` header value,
/// the way a browser would.
pub fn merge_cookies(existing: &str, resp: &Response<Body>) -> String {
    let mut jar: Vec<(String, String)> = existing
        .split("; ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for raw in resp.headers().get_all(header::SET_COOKIE) {
        let raw = raw.to_str().expect("set-cookie was not ascii");
        let Some((name, value)) = raw.split(';').next().and_then(|nv| nv.split_once('=')) else {
            continue;
        };
        jar.retain(|(k, _)| k != name);
        if !value.is_empty() && !raw.contains("Max-Age=0") {
            jar.push((name.to_string(), value.to_string()));
        }
    }

    jar.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}
