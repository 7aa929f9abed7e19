//! Staff-only JSON API for managing questions and choices.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use tracing::info;

use crate::error::PollsError;
use crate::middleware::api_json::ApiJson;
use crate::middleware::session::StaffUser;
use crate::router::PollsState;
use crate::types::admin::{
    ChoicePayload, NewQuestionPayload, QuestionDetail, QuestionPayload, UserSummary,
    validate_text,
};

pub fn admin_router() -> Router<PollsState> {
    Router::new()
        .route("/questions", get(list_questions).post(create_question))
        .route(
            "/questions/{id}",
            get(show_question).put(update_question).delete(delete_question),
        )
        .route("/questions/{id}/choices", post(create_choice))
        .route("/choices/{id}", put(update_choice).delete(delete_choice))
        .route("/users", get(list_users))
}

async fn question_detail(state: &PollsState, id: i64) -> Result<QuestionDetail, PollsError> {
    let question = state
        .storage
        .get_question(id)
        .await?
        .ok_or(PollsError::NotFound("Question"))?;
    let choices = state.storage.results(id).await?;
    Ok(QuestionDetail::new(question, choices, Utc::now()))
}

/// GET /admin/questions -> every question, unpublished ones included.
pub async fn list_questions(
    State(state): State<PollsState>,
    _staff: StaffUser,
) -> Result<Json<Vec<QuestionDetail>>, PollsError> {
    let now = Utc::now();
    let mut out = Vec::new();
    for question in state.storage.list_questions().await? {
        let choices = state.storage.results(question.id).await?;
        out.push(QuestionDetail::new(question, choices, now));
    }
    Ok(Json(out))
}

pub async fn show_question(
    State(state): State<PollsState>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<Json<QuestionDetail>, PollsError> {
    Ok(Json(question_detail(&state, id).await?))
}

/// POST /admin/questions
pub async fn create_question(
    State(state): State<PollsState>,
    StaffUser(staff): StaffUser,
    ApiJson(payload): ApiJson<NewQuestionPayload>,
) -> Result<impl IntoResponse, PollsError> {
    let draft = payload.question.into_draft(Utc::now())?;
    let choices = payload
        .choices
        .iter()
        .map(|c| validate_text("choice_text", c))
        .collect::<Result<Vec<_>, _>>()?;

    let id = state.storage.insert_question(&draft, &choices).await?;
    info!(question_id = id, staff = %staff.username, "question created");
    Ok((StatusCode::CREATED, Json(question_detail(&state, id).await?)))
}

/// PUT /admin/questions/{id}; an omitted `pub_date` keeps the stored one.
pub async fn update_question(
    State(state): State<PollsState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<QuestionPayload>,
) -> Result<Json<QuestionDetail>, PollsError> {
    let current = state
        .storage
        .get_question(id)
        .await?
        .ok_or(PollsError::NotFound("Question"))?;
    let draft = payload.into_draft(current.pub_date)?;

    state.storage.update_question(id, &draft).await?;
    info!(question_id = id, staff = %staff.username, "question updated");
    Ok(Json(question_detail(&state, id).await?))
}

pub async fn delete_question(
    State(state): State<PollsState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, PollsError> {
    if !state.storage.delete_question(id).await? {
        return Err(PollsError::NotFound("Question"));
    }
    info!(question_id = id, staff = %staff.username, "question deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/questions/{id}/choices
pub async fn create_choice(
    State(state): State<PollsState>,
    StaffUser(staff): StaffUser,
    Path(question_id): Path<i64>,
    ApiJson(payload): ApiJson<ChoicePayload>,
) -> Result<impl IntoResponse, PollsError> {
    let text = validate_text("choice_text", &payload.choice_text)?;
    if state.storage.get_question(question_id).await?.is_none() {
        return Err(PollsError::NotFound("Question"));
    }

    let id = state.storage.insert_choice(question_id, &text).await?;
    info!(question_id, choice_id = id, staff = %staff.username, "choice created");
    Ok((
        StatusCode::CREATED,
        Json(question_detail(&state, question_id).await?),
    ))
}

pub async fn update_choice(
    State(state): State<PollsState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<ChoicePayload>,
) -> Result<Json<QuestionDetail>, PollsError> {
    let text = validate_text("choice_text", &payload.choice_text)?;
    let choice = state
        .storage
        .get_choice(id)
        .await?
        .ok_or(PollsError::NotFound("Choice"))?;

    state.storage.update_choice(id, &text).await?;
    info!(choice_id = id, staff = %staff.username, "choice updated");
    Ok(Json(question_detail(&state, choice.question_id).await?))
}

pub async fn delete_choice(
    State(state): State<PollsState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, PollsError> {
    if !state.storage.delete_choice(id).await? {
        return Err(PollsError::NotFound("Choice"));
    }
    info!(choice_id = id, staff = %staff.username, "choice deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<PollsState>,
    _staff: StaffUser,
) -> Result<Json<Vec<UserSummary>>, PollsError> {
    let users = state.storage.list_users().await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}
