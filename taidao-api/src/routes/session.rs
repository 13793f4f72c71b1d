/// Session endpoints
///
/// - `GET /session/` - The logged-in user, or `null`
/// - `POST /log-out/` - Ends every session of the current user

use super::hx_redirect;
use crate::{app::AppState, error::ApiResult, extract::CurrentUser};
use axum::{extract::State, response::Response, Json};
use serde::Serialize;
use taidao_shared::{
    auth::session::clear_session_cookie,
    models::{session::Session, user::User},
};

/// Current session response
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Option<User>,
}

/// Reports who is logged in
pub async fn current_session(CurrentUser(user): CurrentUser) -> Json<SessionResponse> {
    Json(SessionResponse { user })
}

/// Logs out everywhere
///
/// Deletes all sessions of the current user, clears the cookie and sends the
/// client home. Logging out without a session only clears the cookie.
pub async fn log_out(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Response> {
    if let Some(user) = user {
        let removed = Session::delete_for_user(&state.db, &user.username).await?;
        tracing::info!(username = %user.username, sessions = removed, "User logged out");
    }

    hx_redirect("/", Some(clear_session_cookie(state.cookie_secure())))
}
