/// Session ids and the `session` cookie
///
/// A session id is 32 bytes from the operating system RNG encoded as
/// URL-safe base64 (43 characters with padding stripped). The id is the only
/// thing the browser holds; everything else is looked up in
/// `user_log_in_sessions`.
///
/// # Cookie attributes
///
/// `Path=/; HttpOnly; SameSite=Lax; Max-Age=604800`, plus `Secure` unless
/// disabled for local development.

use super::{SESSION_COOKIE, SESSION_TTL};
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes in a session id
const SESSION_ID_BYTES: usize = 32;

/// Generates a new random session id
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds the `Set-Cookie` value that stores `session_id`
pub fn session_cookie(session_id: &str, secure: bool) -> String {
    build_cookie(session_id, SESSION_TTL.num_seconds(), secure)
}

/// Builds the `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    build_cookie("", 0, secure)
}

fn build_cookie(value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Reads a cookie value from the request headers
///
/// Scans every `Cookie` header; the first pair named `name` wins.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::collections::HashSet;

    #[test]
    fn test_session_ids_are_unique_and_url_safe() {
        let ids: HashSet<String> = (0..100).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 100);

        for id in &ids {
            assert_eq!(id.len(), 43);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc", true);
        assert_eq!(
            cookie,
            "session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800; Secure"
        );

        let insecure = session_cookie("abc", false);
        assert!(!insecure.contains("Secure"));
    }

    #[test]
    fn test_clear_session_cookie_expires_immediately() {
        let cookie = clear_session_cookie(false);
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; session=xyz"));
        headers.append(header::COOKIE, HeaderValue::from_static("other=1"));

        assert_eq!(read_cookie(&headers, "session").as_deref(), Some("xyz"));
        assert_eq!(read_cookie(&headers, "other").as_deref(), Some("1"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }
}
