/// Bluesky feed generator endpoints
///
/// This service hosts a single custom feed of top-level posts by enrolled
/// members. The AppView asks for skeletons (post URIs only) and hydrates
/// them itself.
///
/// # Endpoints
///
/// - `GET /xrpc/app.bsky.feed.describeFeedGenerator`
/// - `GET /xrpc/app.bsky.feed.getFeedSkeleton?feed=..&limit=..&cursor=..`
/// - `GET /.well-known/did.json` - `did:web` document for the service

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use taidao_shared::models::feed::{FeedCursor, FeedPost};

/// Page size when the client does not ask for one
pub const DEFAULT_LIMIT: i64 = 50;

/// Largest page a client may ask for
pub const MAX_LIMIT: i64 = 100;

/// Fragment id of the feed generator service in the DID document
pub const SERVICE_ID: &str = "#bsky_fg";

/// Feed the generator advertises
#[derive(Debug, Serialize)]
pub struct FeedDescriptor {
    pub uri: String,
}

/// `app.bsky.feed.describeFeedGenerator` output
#[derive(Debug, Serialize)]
pub struct DescribeFeedGenerator {
    pub did: String,
    pub feeds: Vec<FeedDescriptor>,
}

/// `app.bsky.feed.getFeedSkeleton` parameters, kept as raw text so bad
/// values map to 400 rather than an extractor rejection
#[derive(Debug, Default, Deserialize)]
pub struct SkeletonParams {
    pub feed: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

/// One skeleton entry
#[derive(Debug, Serialize)]
pub struct SkeletonItem {
    pub post: String,
}

/// `app.bsky.feed.getFeedSkeleton` output
#[derive(Debug, Serialize)]
pub struct FeedSkeleton {
    pub feed: Vec<SkeletonItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Parses `limit`, defaulting to [`DEFAULT_LIMIT`]
fn parse_limit(raw: Option<&str>) -> ApiResult<i64> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_LIMIT);
    };

    let limit: i64 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest("limit must be an integer".to_string()))?;

    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    Ok(limit)
}

/// Lists the feeds this generator serves
pub async fn describe_feed_generator(State(state): State<AppState>) -> Json<DescribeFeedGenerator> {
    Json(DescribeFeedGenerator {
        did: state.config.feed.service_did.clone(),
        feeds: vec![FeedDescriptor {
            uri: state.config.feed.feed_uri(),
        }],
    })
}

/// Serves one page of the feed, newest first
///
/// `cursor` is returned only when the page is full, so a short page tells
/// the client it reached the end.
///
/// # Errors
///
/// - `400 Bad Request`: Bad `limit` or malformed `cursor`
/// - `404 Not Found`: `feed` is not the feed this service hosts
pub async fn get_feed_skeleton(
    State(state): State<AppState>,
    Query(params): Query<SkeletonParams>,
) -> ApiResult<Json<FeedSkeleton>> {
    let feed_uri = state.config.feed.feed_uri();
    if params.feed.as_deref() != Some(feed_uri.as_str()) {
        return Err(ApiError::NotFound("Unknown feed".to_string()));
    }

    let limit = parse_limit(params.limit.as_deref())?;
    let cursor = FeedCursor::parse(params.cursor.as_deref().unwrap_or(""))
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let posts = FeedPost::page(&state.db, limit, cursor.as_ref()).await?;

    let next_cursor = if posts.len() as i64 >= limit {
        posts.last().map(|post| FeedCursor::after(post).to_string())
    } else {
        None
    };

    Ok(Json(FeedSkeleton {
        feed: posts
            .into_iter()
            .map(|post| SkeletonItem { post: post.uri })
            .collect(),
        cursor: next_cursor,
    }))
}

/// Serves the `did:web` document that points the AppView at this host
pub async fn did_document(State(state): State<AppState>) -> Json<Value> {
    let feed = &state.config.feed;

    Json(json!({
        "@context": ["https://www.w3.org/ns/did/v1"],
        "id": feed.service_did,
        "service": [{
            "id": SERVICE_ID,
            "type": "BskyFeedGenerator",
            "serviceEndpoint": feed.service_endpoint,
        }],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).unwrap(), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("")).unwrap(), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("1")).unwrap(), 1);
        assert_eq!(parse_limit(Some("100")).unwrap(), 100);
        assert!(parse_limit(Some("0")).is_err());
        assert!(parse_limit(Some("101")).is_err());
        assert!(parse_limit(Some("ten")).is_err());
    }
}
