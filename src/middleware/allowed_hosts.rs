use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use headers::{HeaderMapExt, Host};
use tracing::warn;

use crate::router::PollsState;

/// Hosts accepted in debug mode when no pattern is configured.
const DEBUG_HOSTS: &[&str] = &[".localhost", "127.0.0.1", "[::1]"];

/// Match a bare hostname (no port) against `ALLOWED_HOSTS` patterns:
/// `*` matches anything, `.example.com` matches the domain and its
/// subdomains, anything else must match exactly.
pub fn host_allowed(host: &str, allowed: &[String], debug: bool) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let matches = |pattern: &str| {
        pattern == "*"
            || pattern == host
            || pattern
                .strip_prefix('.')
                .is_some_and(|domain| host == domain || host.ends_with(pattern))
    };

    if allowed.is_empty() && debug {
        return DEBUG_HOSTS.iter().any(|p| matches(*p));
    }
    allowed.iter().any(|p| matches(p.as_str()))
}

/// Reject requests whose `Host` is not allowed with 400, before routing.
pub async fn enforce_allowed_hosts(
    State(state): State<PollsState>,
    req: Request,
    next: Next,
) -> Response {
    let settings = &state.settings;
    let host = req
        .headers()
        .typed_get::<Host>()
        .map(|h| h.hostname().to_string())
        .or_else(|| req.uri().host().map(str::to_string));

    let ok = match host.as_deref() {
        Some(h) => host_allowed(h, &settings.allowed_hosts, settings.debug),
        None => settings.allowed_hosts.iter().any(|p| p == "*"),
    };
    if !ok {
        warn!(host = host.as_deref().unwrap_or("<none>"), "Invalid HTTP_HOST header");
        return (StatusCode::BAD_REQUEST, "Bad Request (400)").into_response();
    }
    next.run(req).await
}
