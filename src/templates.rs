use axum::response::Html;
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::PollsError;
use crate::middleware::flash::FlashMessage;

/// HTML templates compiled into the binary.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("polls/index.html", include_str!("../templates/polls/index.html")),
    ("polls/detail.html", include_str!("../templates/polls/detail.html")),
    ("polls/results.html", include_str!("../templates/polls/results.html")),
    (
        "registration/login.html",
        include_str!("../templates/registration/login.html"),
    ),
    (
        "registration/signup.html",
        include_str!("../templates/registration/signup.html"),
    ),
];

/// The part of the logged-in user every page can see.
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub username: String,
    pub is_staff: bool,
}

pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, PollsError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera })
    }

    /// Render `name` with the per-page context plus the shared `user` and
    /// `messages` variables used by `base.html`.
    pub fn render(
        &self,
        name: &str,
        mut ctx: Context,
        user: Option<UserContext>,
        messages: &[FlashMessage],
    ) -> Result<Html<String>, PollsError> {
        ctx.insert("user", &user);
        ctx.insert("messages", messages);
        Ok(Html(self.tera.render(name, &ctx)?))
    }
}
