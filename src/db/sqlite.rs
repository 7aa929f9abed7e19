use crate::db::migrate::Migrator;
use crate::db::models::{Choice, ChoiceTally, DbUser, Question, Vote, VoteOutcome};
use crate::db::{decode_ts, encode_ts};
use crate::error::PollsError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub type SqlitePool = Pool<Sqlite>;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password, \
     is_staff, is_superuser, is_active, date_joined, last_login";

/// Fields needed to create an account; `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Editable question fields, shared by create and update.
#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PollsStorage {
    pool: SqlitePool,
}

impl PollsStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply pending migrations. Returns the names of the ones that ran.
    pub async fn migrate(&self) -> Result<Vec<&'static str>, PollsError> {
        Migrator::new(&self.pool).run().await
    }

    // ---- users ----

    pub async fn create_user(&self, user: &NewUser) -> Result<i64, PollsError> {
        let res = sqlx::query(
            r#"INSERT INTO auth_user (
                username, email, password, is_staff, is_superuser, is_active, date_joined
            ) VALUES (?, ?, ?, ?, ?, 1, ?)"#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(encode_ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<DbUser>, PollsError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM auth_user WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_user).transpose()
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<DbUser>, PollsError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM auth_user WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_user).transpose()
    }

    /// Case-insensitive, so `Alice` and `alice` cannot both register.
    pub async fn username_taken(&self, username: &str) -> Result<bool, PollsError> {
        let rec: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM auth_user WHERE lower(username) = lower(?)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(rec.0 > 0)
    }

    pub async fn list_users(&self) -> Result<Vec<DbUser>, PollsError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM auth_user ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_user).collect()
    }

    pub async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), PollsError> {
        sqlx::query("UPDATE auth_user SET last_login = ? WHERE id = ?")
            .bind(encode_ts(at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- questions ----

    /// Published questions, newest first.
    pub async fn list_published(&self, now: DateTime<Utc>) -> Result<Vec<Question>, PollsError> {
        let rows = sqlx::query(
            r#"SELECT id, question_text, pub_date, end_date FROM polls_question
               WHERE pub_date <= ? ORDER BY pub_date DESC, id DESC"#,
        )
        .bind(encode_ts(now))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_question).collect()
    }

    pub async fn list_questions(&self) -> Result<Vec<Question>, PollsError> {
        let rows = sqlx::query(
            "SELECT id, question_text, pub_date, end_date FROM polls_question ORDER BY pub_date DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_question).collect()
    }

    pub async fn get_question(&self, id: i64) -> Result<Option<Question>, PollsError> {
        let row = sqlx::query(
            "SELECT id, question_text, pub_date, end_date FROM polls_question WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_question).transpose()
    }

    /// Like `get_question`, but hides questions whose `pub_date` is after `now`.
    pub async fn get_published_question(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Question>, PollsError> {
        Ok(self
            .get_question(id)
            .await?
            .filter(|q| q.is_published_at(now)))
    }

    /// Insert a question and its initial choices in one transaction.
    pub async fn insert_question(
        &self,
        draft: &QuestionDraft,
        choices: &[String],
    ) -> Result<i64, PollsError> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            "INSERT INTO polls_question (question_text, pub_date, end_date) VALUES (?, ?, ?)",
        )
        .bind(&draft.question_text)
        .bind(encode_ts(draft.pub_date))
        .bind(draft.end_date.map(encode_ts))
        .execute(&mut *tx)
        .await?;
        let question_id = res.last_insert_rowid();

        for text in choices {
            sqlx::query("INSERT INTO polls_choice (question_id, choice_text) VALUES (?, ?)")
                .bind(question_id)
                .bind(text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(question_id)
    }

    /// Returns false when no question has this id.
    pub async fn update_question(&self, id: i64, draft: &QuestionDraft) -> Result<bool, PollsError> {
        let res = sqlx::query(
            "UPDATE polls_question SET question_text = ?, pub_date = ?, end_date = ? WHERE id = ?",
        )
        .bind(&draft.question_text)
        .bind(encode_ts(draft.pub_date))
        .bind(draft.end_date.map(encode_ts))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Cascades to the question's choices and votes.
    pub async fn delete_question(&self, id: i64) -> Result<bool, PollsError> {
        let res = sqlx::query("DELETE FROM polls_question WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---- choices ----

    pub async fn choices_for(&self, question_id: i64) -> Result<Vec<Choice>, PollsError> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT id, question_id, choice_text FROM polls_choice WHERE question_id = ? ORDER BY id",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, question_id, choice_text)| Choice {
                id,
                question_id,
                choice_text,
            })
            .collect())
    }

    pub async fn get_choice(&self, id: i64) -> Result<Option<Choice>, PollsError> {
        let row: Option<(i64, i64, String)> =
            sqlx::query_as("SELECT id, question_id, choice_text FROM polls_choice WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, question_id, choice_text)| Choice {
            id,
            question_id,
            choice_text,
        }))
    }

    /// A choice, only if it belongs to `question_id`.
    pub async fn choice_of_question(
        &self,
        question_id: i64,
        choice_id: i64,
    ) -> Result<Option<Choice>, PollsError> {
        Ok(self
            .get_choice(choice_id)
            .await?
            .filter(|c| c.question_id == question_id))
    }

    pub async fn insert_choice(&self, question_id: i64, text: &str) -> Result<i64, PollsError> {
        let res = sqlx::query("INSERT INTO polls_choice (question_id, choice_text) VALUES (?, ?)")
            .bind(question_id)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn update_choice(&self, id: i64, text: &str) -> Result<bool, PollsError> {
        let res = sqlx::query("UPDATE polls_choice SET choice_text = ? WHERE id = ?")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_choice(&self, id: i64) -> Result<bool, PollsError> {
        let res = sqlx::query("DELETE FROM polls_choice WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Vote count per choice, in choice order. Choices without votes count 0.
    pub async fn results(&self, question_id: i64) -> Result<Vec<ChoiceTally>, PollsError> {
        let rows: Vec<(i64, i64, String, i64)> = sqlx::query_as(
            r#"SELECT c.id, c.question_id, c.choice_text, COUNT(v.id)
               FROM polls_choice c
               LEFT JOIN polls_vote v ON v.choice_id = c.id
               WHERE c.question_id = ?
               GROUP BY c.id, c.question_id, c.choice_text
               ORDER BY c.id"#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, question_id, choice_text, votes)| ChoiceTally {
                choice: Choice {
                    id,
                    question_id,
                    choice_text,
                },
                votes,
            })
            .collect())
    }

    // ---- votes ----

    pub async fn vote_of(&self, user_id: i64, question_id: i64) -> Result<Option<Vote>, PollsError> {
        let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT id, user_id, choice_id, question_id FROM polls_vote WHERE user_id = ? AND question_id = ?",
        )
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, user_id, choice_id, question_id)| Vote {
            id,
            user_id,
            choice_id,
            question_id,
        }))
    }

    /// One vote per (user, question): the first call creates it, later calls
    /// move it to `choice`.
    pub async fn record_vote(&self, user_id: i64, choice: &Choice) -> Result<VoteOutcome, PollsError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM polls_vote WHERE user_id = ? AND question_id = ?")
                .bind(user_id)
                .bind(choice.question_id)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO polls_vote (user_id, choice_id, question_id) VALUES (?, ?, ?)
            ON CONFLICT(user_id, question_id) DO UPDATE SET
                choice_id=excluded.choice_id
            "#,
        )
        .bind(user_id)
        .bind(choice.id)
        .bind(choice.question_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(match existing {
            Some(_) => VoteOutcome::Updated,
            None => VoteOutcome::Created,
        })
    }

    fn row_to_question(row: SqliteRow) -> Result<Question, PollsError> {
        let id: i64 = row.try_get("id")?;
        let question_text: String = row.try_get("question_text")?;
        let pub_date_str: String = row.try_get("pub_date")?;
        let end_date_str: Option<String> = row.try_get("end_date")?;

        let end_date = match end_date_str {
            Some(s) => Some(decode_ts(&s)?),
            None => None,
        };

        Ok(Question {
            id,
            question_text,
            pub_date: decode_ts(&pub_date_str)?,
            end_date,
        })
    }

    fn row_to_user(row: SqliteRow) -> Result<DbUser, PollsError> {
        let date_joined_str: String = row.try_get("date_joined")?;
        let last_login_str: Option<String> = row.try_get("last_login")?;
        let last_login = match last_login_str {
            Some(s) => Some(decode_ts(&s)?),
            None => None,
        };

        Ok(DbUser {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            password: row.try_get("password")?,
            is_staff: row.try_get::<i64, _>("is_staff")? != 0,
            is_superuser: row.try_get::<i64, _>("is_superuser")? != 0,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            date_joined: decode_ts(&date_joined_str)?,
            last_login,
        })
    }
}
