//! `loaddata`: seed the database from JSON fixture files.
//!
//! A fixture is a JSON array of `{"model": ..., "pk": ..., "fields": {...}}`
//! objects. Supported models are `auth.user`, `polls.question`,
//! `polls.choice` and `polls.vote`. Objects are upserted by primary key and
//! every file of one invocation shares a single transaction, so a dangling
//! reference anywhere leaves the database untouched.

use crate::db::{PollsStorage, encode_ts};
use crate::error::{PollsError, is_unique_violation};
use crate::service::accounts::{hash_password, is_password_hash};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize)]
struct FixtureObject {
    model: String,
    #[serde(default)]
    pk: Option<i64>,
    #[serde(default)]
    fields: Value,
}

#[derive(Debug, Deserialize)]
struct UserFields {
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    password: String,
    #[serde(default)]
    is_staff: bool,
    #[serde(default)]
    is_superuser: bool,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    date_joined: Option<DateTime<Utc>>,
    #[serde(default)]
    last_login: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct QuestionFields {
    question_text: String,
    pub_date: DateTime<Utc>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ChoiceFields {
    question: i64,
    choice_text: String,
}

#[derive(Debug, Deserialize)]
struct VoteFields {
    choice: i64,
    user: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub objects: usize,
    pub fixtures: usize,
}

/// Load every fixture in `paths`, in order, atomically.
pub async fn load_fixtures(
    storage: &PollsStorage,
    paths: &[PathBuf],
) -> Result<LoadReport, PollsError> {
    let mut parsed = Vec::with_capacity(paths.len());
    for path in paths {
        parsed.push((path.as_path(), read_fixture(path).await?));
    }

    let mut tx = storage.pool().begin().await?;
    let mut objects = 0;
    for (path, items) in &parsed {
        for item in items {
            install(&mut *tx, path, item).await?;
            objects += 1;
        }
    }
    tx.commit().await?;

    info!(
        objects,
        fixtures = parsed.len(),
        "Installed {} object(s) from {} fixture(s)",
        objects,
        parsed.len()
    );
    Ok(LoadReport {
        objects,
        fixtures: parsed.len(),
    })
}

async fn read_fixture(path: &Path) -> Result<Vec<FixtureObject>, PollsError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PollsError::fixture(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&contents)
        .map_err(|e| PollsError::fixture(path.display().to_string(), e.to_string()))
}

async fn install(
    conn: &mut SqliteConnection,
    path: &Path,
    item: &FixtureObject,
) -> Result<(), PollsError> {
    let label = format!(
        "{} pk={}",
        item.model,
        item.pk.map_or_else(|| "-".to_string(), |pk| pk.to_string())
    );
    let fail = |msg: String| PollsError::fixture(path.display().to_string(), format!("{label}: {msg}"));

    let res = match item.model.to_ascii_lowercase().as_str() {
        "auth.user" => install_user(conn, item.pk, fields(&item.fields).map_err(fail)?).await,
        "polls.question" => {
            install_question(conn, item.pk, fields(&item.fields).map_err(fail)?).await
        }
        "polls.choice" => install_choice(conn, item.pk, fields(&item.fields).map_err(fail)?).await,
        "polls.vote" => install_vote(conn, item.pk, fields(&item.fields).map_err(fail)?).await,
        other => return Err(fail(format!("unknown model `{other}`"))),
    };

    res.map_err(|e| match e {
        InstallError::Rejected(msg) => fail(msg),
        InstallError::Database(db) => fail(db.to_string()),
    })
}

fn fields<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, String> {
    T::deserialize(value).map_err(|e| format!("invalid fields: {e}"))
}

enum InstallError {
    Rejected(String),
    Database(sqlx::Error),
}

impl From<sqlx::Error> for InstallError {
    fn from(e: sqlx::Error) -> Self {
        InstallError::Database(e)
    }
}

async fn exists(conn: &mut SqliteConnection, table: &str, id: i64) -> Result<bool, sqlx::Error> {
    let rec: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_one(conn)
        .await?;
    Ok(rec.0 > 0)
}

async fn install_user(
    conn: &mut SqliteConnection,
    pk: Option<i64>,
    f: UserFields,
) -> Result<(), InstallError> {
    let password = if is_password_hash(&f.password) {
        f.password
    } else {
        hash_password(&f.password).map_err(|e| InstallError::Rejected(e.to_string()))?
    };

    sqlx::query(
        r#"
        INSERT INTO auth_user (
            id, username, email, first_name, last_name, password,
            is_staff, is_superuser, is_active, date_joined, last_login
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            username=excluded.username,
            email=excluded.email,
            first_name=excluded.first_name,
            last_name=excluded.last_name,
            password=excluded.password,
            is_staff=excluded.is_staff,
            is_superuser=excluded.is_superuser,
            is_active=excluded.is_active,
            date_joined=excluded.date_joined,
            last_login=excluded.last_login
        "#,
    )
    .bind(pk)
    .bind(f.username)
    .bind(f.email)
    .bind(f.first_name)
    .bind(f.last_name)
    .bind(password)
    .bind(f.is_staff)
    .bind(f.is_superuser)
    .bind(f.is_active)
    .bind(encode_ts(f.date_joined.unwrap_or_else(Utc::now)))
    .bind(f.last_login.map(encode_ts))
    .execute(conn)
    .await?;
    Ok(())
}

async fn install_question(
    conn: &mut SqliteConnection,
    pk: Option<i64>,
    f: QuestionFields,
) -> Result<(), InstallError> {
    sqlx::query(
        r#"
        INSERT INTO polls_question (id, question_text, pub_date, end_date) VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            question_text=excluded.question_text,
            pub_date=excluded.pub_date,
            end_date=excluded.end_date
        "#,
    )
    .bind(pk)
    .bind(f.question_text)
    .bind(encode_ts(f.pub_date))
    .bind(f.end_date.map(encode_ts))
    .execute(conn)
    .await?;
    Ok(())
}

async fn install_choice(
    conn: &mut SqliteConnection,
    pk: Option<i64>,
    f: ChoiceFields,
) -> Result<(), InstallError> {
    let question = f.question;
    if !exists(&mut *conn, "polls_question", question).await? {
        return Err(InstallError::Rejected(format!(
            "question {question} does not exist"
        )));
    }

    // Votes follow a moved choice through the (choice_id, question_id) key.
    sqlx::query(
        r#"
        INSERT INTO polls_choice (id, question_id, choice_text) VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            question_id=excluded.question_id,
            choice_text=excluded.choice_text
        "#,
    )
    .bind(pk)
    .bind(question)
    .bind(f.choice_text)
    .execute(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            InstallError::Rejected(format!(
                "moving it to question {question} would give a user two votes there"
            ))
        } else {
            InstallError::Database(e)
        }
    })?;
    Ok(())
}

async fn install_vote(
    conn: &mut SqliteConnection,
    pk: Option<i64>,
    f: VoteFields,
) -> Result<(), InstallError> {
    let question: Option<(i64,)> = sqlx::query_as("SELECT question_id FROM polls_choice WHERE id = ?")
        .bind(f.choice)
        .fetch_optional(&mut *conn)
        .await?;
    let Some((question_id,)) = question else {
        return Err(InstallError::Rejected(format!("choice {} does not exist", f.choice)));
    };
    if !exists(&mut *conn, "auth_user", f.user).await? {
        return Err(InstallError::Rejected(format!("user {} does not exist", f.user)));
    }

    sqlx::query(
        r#"
        INSERT INTO polls_vote (id, user_id, choice_id, question_id) VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_id=excluded.user_id,
            choice_id=excluded.choice_id,
            question_id=excluded.question_id
        "#,
    )
    .bind(pk)
    .bind(f.user)
    .bind(f.choice)
    .bind(question_id)
    .execute(conn)
    .await?;
    Ok(())
}
