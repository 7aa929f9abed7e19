use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PollsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Figment error: {0}")]
    Figment(#[from] figment::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Migration {version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: &'static str,
        #[source]
        source: SqlxError,
    },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Password hash error: {0}")]
    PasswordHash(String),

    #[error("Fixture {path}: {message}")]
    Fixture { path: String, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Permission denied")]
    Forbidden,

    #[error("Too many requests")]
    RateLimited,
}

impl PollsError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, PollsError::DatabaseError(e) if is_unique_violation(e))
    }

    pub fn fixture(path: impl Into<String>, message: impl Into<String>) -> Self {
        PollsError::Fixture {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// True for a `UNIQUE` constraint failure.
pub fn is_unique_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(db) if db.is_unique_violation())
}

impl From<JsonRejection> for PollsError {
    fn from(e: JsonRejection) -> Self {
        match e.status() {
            StatusCode::PAYLOAD_TOO_LARGE => PollsError::PayloadTooLarge,
            _ => PollsError::BadRequest(e.body_text()),
        }
    }
}

impl From<FormRejection> for PollsError {
    fn from(e: FormRejection) -> Self {
        match e.status() {
            StatusCode::PAYLOAD_TOO_LARGE => PollsError::PayloadTooLarge,
            _ => PollsError::BadRequest(e.body_text()),
        }
    }
}

impl From<argon2::password_hash::Error> for PollsError {
    fn from(e: argon2::password_hash::Error) -> Self {
        PollsError::PasswordHash(e.to_string())
    }
}

impl IntoResponse for PollsError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            PollsError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{what} not found."),
                },
            ),
            PollsError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "INVALID".to_string(),
                    message: msg,
                },
            ),
            PollsError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Authentication required.".to_string(),
                },
            ),
            PollsError::Forbidden => (
                StatusCode::FORBIDDEN,
                ApiErrorBody {
                    code: "FORBIDDEN".to_string(),
                    message: "Staff access required.".to_string(),
                },
            ),
            PollsError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ApiErrorBody {
                    code: "RATE_LIMIT".to_string(),
                    message: "Too many attempts, try again later.".to_string(),
                },
            ),
            PollsError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "BAD_REQUEST".to_string(),
                    message: msg,
                },
            ),
            PollsError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiErrorBody {
                    code: "PAYLOAD_TOO_LARGE".to_string(),
                    message: "Request body too large.".to_string(),
                },
            ),
            err => {
                tracing::error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorBody {
                        code: "INTERNAL_ERROR".to_string(),
                        message: "An internal server error occurred.".to_string(),
                    },
                )
            }
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
