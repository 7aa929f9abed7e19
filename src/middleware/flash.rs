//! One-shot messages carried to the next rendered page in an encrypted cookie.

use axum_extra::extract::cookie::PrivateCookieJar;
use serde::{Deserialize, Serialize};

use crate::middleware::session::{build_cookie, clear_cookie};

pub const FLASH_COOKIE: &str = "messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: Level,
    pub text: String,
}

/// Pending messages; an unreadable cookie counts as empty.
pub fn peek(jar: &PrivateCookieJar) -> Vec<FlashMessage> {
    jar.get(FLASH_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .unwrap_or_default()
}

pub fn push(
    jar: PrivateCookieJar,
    level: Level,
    text: impl Into<String>,
    secure: bool,
) -> PrivateCookieJar {
    let mut messages = peek(&jar);
    messages.push(FlashMessage {
        level,
        text: text.into(),
    });
    match serde_json::to_string(&messages) {
        Ok(encoded) => jar.add(build_cookie(FLASH_COOKIE, encoded, secure, None)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode flash messages");
            jar
        }
    }
}

/// Drain pending messages and expire the cookie.
pub fn take(jar: PrivateCookieJar) -> (PrivateCookieJar, Vec<FlashMessage>) {
    let messages = peek(&jar);
    if messages.is_empty() {
        return (jar, messages);
    }
    (jar.remove(clear_cookie(FLASH_COOKIE)), messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Key;

    #[test]
    fn messages_accumulate_and_drain_once() {
        let jar = PrivateCookieJar::new(Key::generate());
        let jar = push(jar, Level::Error, "first", true);
        let jar = push(jar, Level::Success, "second", true);

        let (jar, messages) = take(jar);
        assert_eq!(
            messages.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
        assert_eq!(messages[0].level, Level::Error);

        let (_, again) = take(jar);
        assert!(again.is_empty());
    }
}
