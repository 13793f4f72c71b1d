/// Feed member listing
///
/// `GET /bsky-taiwanese/` returns the Bluesky profiles of everyone enrolled
/// in the feed, newest member first.

use crate::{
    app::AppState,
    clients::bsky::Profile,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Json};
use serde::Serialize;
use taidao_shared::models::feed::FeedMember;

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub profiles: Vec<Profile>,
}

/// Lists member profiles
///
/// # Errors
///
/// - `500 Internal Server Error`: The AppView failed for some batch
pub async fn list_members(State(state): State<AppState>) -> ApiResult<Json<MembersResponse>> {
    let dids: Vec<String> = FeedMember::list_newest_first(&state.db)
        .await?
        .into_iter()
        .map(|member| member.did)
        .collect();

    let profiles = state
        .profiles
        .resolve(&dids)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch member profiles", e))?;

    Ok(Json(MembersResponse { profiles }))
}
