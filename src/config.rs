use axum_extra::extract::cookie::Key;
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::error::PollsError;

/// Environment keys routed into `[basic]`.
const BASIC_KEYS: &[&str] = &[
    "DATABASE_URL",
    "BIND_ADDR",
    "LOGLEVEL",
    "DEBUG",
    "TIMEZONE",
    "STATIC_ROOT",
];

/// Environment keys routed into `[security]`.
const SECURITY_KEYS: &[&str] = &[
    "ALLOWED_HOSTS",
    "SECRET_KEY",
    "INSECURE_COOKIE",
    "LOGIN_RATE_PER_MINUTE",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub loglevel: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub debug: bool,
    pub timezone: String,
    pub static_root: PathBuf,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:db.sqlite3".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            debug: false,
            timezone: "UTC".to_string(),
            static_root: PathBuf::from("staticfiles"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Comma separated host patterns, `*` allows any host.
    pub allowed_hosts: String,
    pub secret_key: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub insecure_cookie: bool,
    pub login_rate_per_minute: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: "localhost,127.0.0.1".to_string(),
            secret_key: None,
            insecure_cookie: false,
            login_rate_per_minute: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub security: SecurityConfig,
}

impl Config {
    /// Build the configuration from defaults overlaid with process environment.
    /// Call `dotenvy::dotenv()` first to pick up a local `.env`.
    pub fn from_env() -> Result<Self, PollsError> {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(
                Env::raw()
                    .only(BASIC_KEYS)
                    .map(|k| format!("basic.{k}").into()),
            )
            .merge(
                Env::raw()
                    .only(SECURITY_KEYS)
                    .map(|k| format!("security.{k}").into()),
            )
            .extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would otherwise only fail once the server is up.
    pub fn validate(&self) -> Result<(), PollsError> {
        self.timezone()?;
        if let Some(secret) = self.security.secret_key.as_deref()
            && secret.len() < 32
        {
            return Err(PollsError::Config(
                "SECRET_KEY must be at least 32 bytes".to_string(),
            ));
        }
        if self.security.login_rate_per_minute == 0 {
            return Err(PollsError::Config(
                "LOGIN_RATE_PER_MINUTE must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn allowed_hosts(&self) -> Vec<String> {
        self.security
            .allowed_hosts
            .split(',')
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect()
    }

    pub fn timezone(&self) -> Result<Tz, PollsError> {
        self.basic
            .timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| PollsError::Config(format!("invalid TIMEZONE: {e}")))
    }

    /// Cookie encryption key. Without `SECRET_KEY` sessions only live as long
    /// as the process.
    pub fn cookie_key(&self) -> Key {
        match self.security.secret_key.as_deref() {
            Some(secret) => Key::derive_from(secret.as_bytes()),
            None => Key::generate(),
        }
    }
}

/// Accepts `true`/`false`, `True`/`False`, `1`/`0`, `yes`/`no`, `on`/`off`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => Ok(b),
        Raw::Int(i) => Ok(i != 0),
        Raw::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got `{other}`"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn allowed_hosts_are_trimmed_and_lowercased() {
        let mut cfg = Config::default();
        cfg.security.allowed_hosts = " Example.com, ,.polls.test ".to_string();
        assert_eq!(cfg.allowed_hosts(), vec!["example.com", ".polls.test"]);
    }

    #[test]
    fn invalid_timezone_fails_validation() {
        let mut cfg = Config::default();
        cfg.basic.timezone = "Mars/Olympus".to_string();
        assert!(matches!(cfg.validate(), Err(PollsError::Config(_))));
    }

    #[test]
    fn zero_login_rate_fails_validation() {
        let mut cfg = Config::default();
        cfg.security.login_rate_per_minute = 0;
        assert!(matches!(cfg.validate(), Err(PollsError::Config(_))));
    }

    #[test]
    fn short_secret_key_fails_validation() {
        let mut cfg = Config::default();
        cfg.security.secret_key = Some("too-short".to_string());
        assert!(cfg.validate().is_err());
    }

    #[rstest]
    #[case("True", true)]
    #[case("false", false)]
    #[case("1", true)]
    #[case("off", false)]
    fn debug_flag_accepts_common_spellings(#[case] raw: &str, #[case] expected: bool) {
        let json = format!(r#"{{"basic": {{"debug": "{raw}"}}}}"#);
        let cfg: Config = serde_json::from_str(&json).expect("config should parse");
        assert_eq!(cfg.basic.debug, expected);
    }
}
