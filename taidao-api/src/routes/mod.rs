/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `session`: Current user and log-out
/// - `email_auth`: Email sign-up and log-in with one-time codes
/// - `phone_auth`: Phone log-in through Twilio Verify
/// - `feed`: Bluesky feed generator XRPC endpoints
/// - `profiles`: Profiles of enrolled feed members
/// - `chat`: Streaming chat relay
/// - `weather`: CWA forecasts and weather chat
///
/// Form flows answer htmx requests with `303 See Other` and an
/// `HX-Redirect` header naming the next page.

pub mod chat;
pub mod email_auth;
pub mod feed;
pub mod health;
pub mod phone_auth;
pub mod profiles;
pub mod session;
pub mod weather;

use crate::error::{ApiError, ApiResult};
use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// htmx client-side redirect header
pub const HX_REDIRECT: HeaderName = HeaderName::from_static("hx-redirect");

/// Builds a `303` response that sends an htmx client to `location`,
/// optionally setting a cookie on the way
pub(crate) fn hx_redirect(location: &str, set_cookie: Option<String>) -> ApiResult<Response> {
    let mut response = StatusCode::SEE_OTHER.into_response();
    let headers = response.headers_mut();

    let location = HeaderValue::from_str(location)
        .map_err(|e| ApiError::internal("Invalid redirect location", e))?;
    headers.insert(HX_REDIRECT, location);

    if let Some(cookie) = set_cookie {
        let cookie = HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::internal("Invalid cookie", e))?;
        headers.insert(header::SET_COOKIE, cookie);
    }

    Ok(response)
}

/// Appends form-encoded query parameters to a site path
pub(crate) fn with_query(path: &str, params: &[(&str, &str)]) -> ApiResult<String> {
    let url = reqwest::Url::parse_with_params(&format!("http://localhost{}", path), params)
        .map_err(|e| ApiError::internal("Invalid redirect path", e))?;

    Ok(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}
