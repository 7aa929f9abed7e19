//! Database module: models, migrations and storage for the polls app.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows plus the voting-window rules
//! - `schema.rs`: versioned SQL migrations (SQLite)
//! - `migrate.rs`: applies pending migrations and reports their state
//! - `sqlite.rs`: query layer used by handlers and commands

pub mod migrate;
pub mod models;
pub mod schema;
pub mod sqlite;

use crate::error::PollsError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

pub use migrate::{MigrationState, Migrator};
pub use models::{Choice, ChoiceTally, DbUser, PollStatus, Question, Vote, VoteOutcome};
pub use sqlite::{PollsStorage, SqlitePool};

/// Open (creating if needed) the SQLite database with foreign keys enforced.
pub async fn connect(database_url: &str) -> Result<SqlitePool, PollsError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
    Ok(pool)
}

/// Timestamps are stored as UTC RFC3339 with microseconds, which keeps
/// lexicographic order equal to chronological order.
pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 9, 1, 9, 5, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(encode_ts(early) < encode_ts(late));
        assert_eq!(encode_ts(early), "2024-09-01T09:05:00.000000Z");
    }

    #[test]
    fn decode_accepts_offsets() {
        let ts = decode_ts("2024-09-01T16:05:00+07:00").unwrap();
        assert_eq!(encode_ts(ts), "2024-09-01T09:05:00.000000Z");
    }
}
