use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{ChoiceTally, DbUser, PollStatus, Question};
use crate::db::sqlite::QuestionDraft;
use crate::error::PollsError;

pub const TEXT_MAX_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct QuestionPayload {
    pub question_text: String,
    /// Defaults to now on create, and to the stored value on update.
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct NewQuestionPayload {
    #[serde(flatten)]
    pub question: QuestionPayload,
    #[serde(default)]
    pub choices: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChoicePayload {
    pub choice_text: String,
}

impl QuestionPayload {
    pub fn into_draft(self, fallback_pub_date: DateTime<Utc>) -> Result<QuestionDraft, PollsError> {
        let question_text = validate_text("question_text", &self.question_text)?;
        let pub_date = self.pub_date.unwrap_or(fallback_pub_date);
        if let Some(end) = self.end_date
            && end < pub_date
        {
            return Err(PollsError::Validation(
                "end_date must not be before pub_date".to_string(),
            ));
        }
        Ok(QuestionDraft {
            question_text,
            pub_date,
            end_date: self.end_date,
        })
    }
}

/// Trimmed, non-empty, at most 200 characters.
pub fn validate_text(field: &str, value: &str) -> Result<String, PollsError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PollsError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > TEXT_MAX_LEN {
        return Err(PollsError::Validation(format!(
            "{field} must be at most {TEXT_MAX_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub was_published_recently: bool,
    pub status: PollStatus,
    pub choices: Vec<ChoiceTally>,
}

impl QuestionDetail {
    pub fn new(question: Question, choices: Vec<ChoiceTally>, now: DateTime<Utc>) -> Self {
        Self {
            was_published_recently: question.was_published_recently_at(now),
            status: question.status_at(now),
            question,
            choices,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<DbUser> for UserSummary {
    fn from(u: DbUser) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            is_staff: u.is_staff,
            is_superuser: u.is_superuser,
            is_active: u.is_active,
            date_joined: u.date_joined,
            last_login: u.last_login,
        }
    }
}
