/// Request extractors
///
/// [`CurrentUser`] resolves the `session` cookie to the logged-in user.

use crate::{app::AppState, error::ApiError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use taidao_shared::{
    auth::{session::read_cookie, SESSION_COOKIE, SESSION_TTL},
    models::{session::Session, user::User},
};

/// The user behind the session cookie, if any
///
/// A missing cookie, an unknown id and an expired session all yield
/// `CurrentUser(None)`. Only a failing database rejects the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(session_id) = read_cookie(&parts.headers, SESSION_COOKIE) else {
            return Ok(CurrentUser(None));
        };

        let user = Session::find_user(&state.db, &session_id, SESSION_TTL).await?;
        Ok(CurrentUser(user))
    }
}
