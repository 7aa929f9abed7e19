use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use std::convert::Infallible;
use time::Duration;

use crate::db::models::DbUser;
use crate::error::PollsError;
use crate::middleware::flash::{self, FlashMessage, Level};
use crate::router::PollsState;
use crate::templates::UserContext;

pub const SESSION_COOKIE: &str = "sessionid";

/// Two weeks, like a typical "remember me" browser session.
const SESSION_MAX_AGE: Duration = Duration::weeks(2);

/// Cookie-backed session: the logged-in user plus pending flash messages.
/// Return it as part of the response so cookie changes reach the client.
pub struct Session {
    jar: PrivateCookieJar,
    secure: bool,
    user: Option<DbUser>,
}

impl Session {
    pub fn user(&self) -> Option<&DbUser> {
        self.user.as_ref()
    }

    pub fn user_context(&self) -> Option<UserContext> {
        self.user.as_ref().map(|u| UserContext {
            username: u.username.clone(),
            is_staff: u.is_staff,
        })
    }

    pub fn login(self, user: DbUser) -> Self {
        let cookie = build_cookie(
            SESSION_COOKIE,
            user.id.to_string(),
            self.secure,
            Some(SESSION_MAX_AGE),
        );
        Self {
            jar: self.jar.add(cookie),
            user: Some(user),
            ..self
        }
    }

    pub fn logout(self) -> Self {
        Self {
            jar: self.jar.remove(clear_cookie(SESSION_COOKIE)),
            user: None,
            ..self
        }
    }

    pub fn flash(self, level: Level, text: impl Into<String>) -> Self {
        Self {
            jar: flash::push(self.jar, level, text, self.secure),
            ..self
        }
    }

    pub fn take_messages(self) -> (Self, Vec<FlashMessage>) {
        let (jar, messages) = flash::take(self.jar);
        (Self { jar, ..self }, messages)
    }
}

impl FromRequestParts<PollsState> for Session {
    type Rejection = PollsError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PollsState,
    ) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::<Key>::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never: Infallible| match never {});

        let user_id = jar
            .get(SESSION_COOKIE)
            .and_then(|c| c.value().parse::<i64>().ok());
        let user = match user_id {
            Some(id) => state.storage.get_user(id).await?.filter(|u| u.is_active),
            None => None,
        };

        Ok(Self {
            jar,
            secure: state.settings.secure_cookies,
            user,
        })
    }
}

impl IntoResponseParts for Session {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.jar.into_response_parts(res)
    }
}

/// A logged-in staff member; rejects with 401 when anonymous, 403 otherwise.
pub struct StaffUser(pub DbUser);

impl FromRequestParts<PollsState> for StaffUser {
    type Rejection = PollsError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PollsState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        match session.user {
            None => Err(PollsError::Unauthorized),
            Some(user) if !user.is_staff => Err(PollsError::Forbidden),
            Some(user) => Ok(StaffUser(user)),
        }
    }
}

pub(crate) fn build_cookie(
    name: &str,
    value: String,
    secure: bool,
    max_age: Option<Duration>,
) -> Cookie<'static> {
    let mut builder = Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax);
    if let Some(age) = max_age {
        builder = builder.max_age(age);
    }
    builder.build()
}

pub(crate) fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
