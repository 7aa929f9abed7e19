use axum::{
    Form,
    extract::{Path, State, rejection::FormRejection},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tera::Context;
use tracing::{error, info, warn};

use crate::db::models::{PollStatus, Question, VoteOutcome};
use crate::error::PollsError;
use crate::handlers::render_page;
use crate::middleware::client_ip::ClientIp;
use crate::middleware::flash::Level;
use crate::middleware::session::Session;
use crate::router::PollsState;
use crate::types::forms::{VoteForm, login_url};

const VOTING_CLOSED: &str = "Voting is not allowed for this poll.";
const NO_CHOICE: &str = "You didn't select a choice.";

/// Question as shown in templates, dates already in the local timezone.
#[derive(Debug, Serialize)]
struct QuestionView {
    id: i64,
    question_text: String,
    pub_date: String,
    end_date: Option<String>,
    status: PollStatus,
    open: bool,
}

impl QuestionView {
    fn new(q: &Question, now: DateTime<Utc>, tz: &Tz) -> Self {
        let status = q.status_at(now);
        Self {
            id: q.id,
            question_text: q.question_text.clone(),
            pub_date: local_time(q.pub_date, tz),
            end_date: q.end_date.map(|d| local_time(d, tz)),
            status,
            open: status == PollStatus::Open,
        }
    }
}

#[derive(Debug, Serialize)]
struct TallyView {
    choice_text: String,
    votes: i64,
    percent: i64,
}

fn local_time(ts: DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz).format("%b %-d, %Y, %H:%M").to_string()
}

/// GET /polls/ -> published questions, newest first, with open/closed status.
pub async fn index(
    State(state): State<PollsState>,
    session: Session,
) -> Result<Response, PollsError> {
    let now = Utc::now();
    let tz = &state.settings.timezone;
    let questions: Vec<QuestionView> = state
        .storage
        .list_published(now)
        .await?
        .iter()
        .map(|q| QuestionView::new(q, now, tz))
        .collect();

    let mut ctx = Context::new();
    ctx.insert("questions", &questions);
    render_page(&state, session, "polls/index.html", ctx)
}

/// GET /polls/{id}/ -> voting form. Closed polls bounce back to the index.
pub async fn detail(
    State(state): State<PollsState>,
    Path(id): Path<i64>,
    session: Session,
) -> Result<Response, PollsError> {
    let now = Utc::now();
    let question = state
        .storage
        .get_published_question(id, now)
        .await?
        .ok_or(PollsError::NotFound("Question"))?;

    if !question.can_vote_at(now) {
        let session = session.flash(Level::Error, VOTING_CLOSED);
        return Ok((session, Redirect::to("/polls/")).into_response());
    }

    render_detail(&state, session, &question, None).await
}

async fn render_detail(
    state: &PollsState,
    session: Session,
    question: &Question,
    error_message: Option<&str>,
) -> Result<Response, PollsError> {
    let choices = state.storage.choices_for(question.id).await?;
    let previous_vote = match session.user() {
        Some(user) => state
            .storage
            .vote_of(user.id, question.id)
            .await?
            .map(|v| v.choice_id),
        None => None,
    };

    let mut ctx = Context::new();
    ctx.insert(
        "question",
        &QuestionView::new(question, Utc::now(), &state.settings.timezone),
    );
    ctx.insert("choices", &choices);
    ctx.insert("previous_vote", &previous_vote);
    ctx.insert("error_message", &error_message);
    render_page(state, session, "polls/detail.html", ctx)
}

/// GET /polls/{id}/results/
pub async fn results(
    State(state): State<PollsState>,
    Path(id): Path<i64>,
    session: Session,
) -> Result<Response, PollsError> {
    let now = Utc::now();
    let question = state
        .storage
        .get_published_question(id, now)
        .await?
        .ok_or(PollsError::NotFound("Question"))?;

    let tallies = state.storage.results(id).await?;
    let total: i64 = tallies.iter().map(|t| t.votes).sum();
    let rows: Vec<TallyView> = tallies
        .into_iter()
        .map(|t| TallyView {
            percent: if total > 0 { t.votes * 100 / total } else { 0 },
            choice_text: t.choice.choice_text,
            votes: t.votes,
        })
        .collect();

    let mut ctx = Context::new();
    ctx.insert(
        "question",
        &QuestionView::new(&question, now, &state.settings.timezone),
    );
    ctx.insert("tallies", &rows);
    ctx.insert("total", &total);
    ctx.insert("open", &question.can_vote_at(now));
    render_page(&state, session, "polls/results.html", ctx)
}

/// POST /polls/{id}/vote/ -> create or replace the user's vote.
/// Anonymous posts go to the login page whatever their body looks like.
pub async fn vote(
    State(state): State<PollsState>,
    Path(id): Path<i64>,
    ClientIp(ip): ClientIp,
    session: Session,
    form: Result<Form<VoteForm>, FormRejection>,
) -> Result<Response, PollsError> {
    let Some(user) = session.user().cloned() else {
        return Ok(Redirect::to(&login_url(&format!("/polls/{id}/"))).into_response());
    };
    let Form(form) = form?;
    info!("User {} is voting on question {}", user.username, id);

    let now = Utc::now();
    let question = state
        .storage
        .get_question(id)
        .await?
        .ok_or(PollsError::NotFound("Question"))?;

    if !question.can_vote_at(now) {
        warn!(
            "User {} tried to vote on closed question {} from {}",
            user.username, id, ip
        );
        let session = session.flash(Level::Error, VOTING_CLOSED);
        return Ok((session, Redirect::to("/polls/")).into_response());
    }

    let choice = match form.choice_id() {
        Some(choice_id) => state.storage.choice_of_question(id, choice_id).await?,
        None => None,
    };
    let Some(choice) = choice else {
        error!("Choice does not exist for question {}", id);
        return render_detail(&state, session, &question, Some(NO_CHOICE)).await;
    };

    match state.storage.record_vote(user.id, &choice).await? {
        VoteOutcome::Created => info!(
            "User {} is voting for choice {} on question {} from {}",
            user.username, choice.id, id, ip
        ),
        VoteOutcome::Updated => info!(
            "User {} is updating their vote to choice {} on question {} from {}",
            user.username, choice.id, id, ip
        ),
    }

    let session = session.flash(
        Level::Success,
        format!("Your vote for '{}' has been recorded.", choice.choice_text),
    );
    Ok((session, Redirect::to(&format!("/polls/{id}/results/"))).into_response())
}
