pub mod accounts;
pub mod admin;
pub mod polls;

use axum::response::{IntoResponse, Response};
use tera::Context;

use crate::error::PollsError;
use crate::middleware::session::Session;
use crate::router::PollsState;

/// Render a full page, consuming any pending flash messages.
pub(crate) fn render_page(
    state: &PollsState,
    session: Session,
    template: &str,
    ctx: Context,
) -> Result<Response, PollsError> {
    let user = session.user_context();
    let (session, messages) = session.take_messages();
    let html = state.templates.render(template, ctx, user, &messages)?;
    Ok((session, html).into_response())
}
