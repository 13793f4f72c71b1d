/// Phone log-in through Twilio Verify
///
/// - `POST /log-in-by-phone/` (form `phone`) - Texts a code
/// - `POST /verify-log-in-phone/` (form `phone`, `code`) - Checks it
///
/// A phone number becomes an account on its first approved check, with the
/// number doubling as the username. Email sign-up cannot pick such names.

use super::{hx_redirect, with_query};
use crate::{
    app::AppState,
    clients::twilio::{Channel, OtpVerifier, VerificationStatus},
    error::{ApiError, ApiResult},
};
use axum::{extract::State, response::Response, Form};
use serde::Deserialize;
use std::sync::Arc;
use taidao_shared::{
    auth::session::session_cookie,
    models::{session::Session, user::User},
};

#[derive(Debug, Deserialize)]
pub struct PhoneForm {
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPhoneForm {
    #[serde(default)]
    pub phone: String,

    #[serde(default)]
    pub code: String,
}

/// `+` followed by 8 to 15 digits
pub fn is_e164(phone: &str) -> bool {
    match phone.strip_prefix('+') {
        Some(digits) => {
            (8..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// 4 to 10 digits, the range Twilio Verify accepts
pub fn is_verify_code(code: &str) -> bool {
    (4..=10).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit())
}

fn require_e164(phone: &str) -> ApiResult<()> {
    if is_e164(phone) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "Phone number must be in E.164 format, e.g. +886912345678".to_string(),
        ))
    }
}

fn verifier(state: &AppState) -> ApiResult<Arc<dyn OtpVerifier>> {
    state
        .verifier
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Phone log-in is not configured".to_string()))
}

/// Texts a verification code
///
/// # Errors
///
/// - `400 Bad Request`: Not an E.164 number
/// - `503 Service Unavailable`: Phone log-in is not configured
pub async fn log_in_by_phone(
    State(state): State<AppState>,
    Form(form): Form<PhoneForm>,
) -> ApiResult<Response> {
    require_e164(&form.phone)?;
    let verifier = verifier(&state)?;

    verifier
        .start(&form.phone, Channel::Sms)
        .await
        .map_err(|e| ApiError::internal("Failed to start phone verification", e))?;

    let location = with_query("/verify-log-in-phone/", &[("phone", &form.phone)])?;
    hx_redirect(&location, None)
}

/// Checks the texted code and logs in
///
/// # Errors
///
/// - `400 Bad Request`: Malformed phone number or code
/// - `401 Unauthorized`: The provider did not approve the code
/// - `409 Conflict`: An email account already uses the number as its username
/// - `503 Service Unavailable`: Phone log-in is not configured
pub async fn verify_log_in_phone(
    State(state): State<AppState>,
    Form(form): Form<VerifyPhoneForm>,
) -> ApiResult<Response> {
    require_e164(&form.phone)?;
    if !is_verify_code(&form.code) {
        return Err(ApiError::BadRequest(
            "Code must be 4 to 10 digits".to_string(),
        ));
    }
    let verifier = verifier(&state)?;

    let status = verifier
        .check(&form.phone, &form.code)
        .await
        .map_err(|e| ApiError::internal("Failed to check phone verification", e))?;

    if status != VerificationStatus::Approved {
        tracing::info!(status = ?status, "Phone verification not approved");
        return Err(ApiError::Unauthorized(
            "Verification code was not approved".to_string(),
        ));
    }

    let user = User::ensure_phone_user(&state.db, &form.phone)
        .await?
        .ok_or_else(|| {
            tracing::warn!(phone = %form.phone, "Phone number is taken as an email username");
            ApiError::Conflict("username".to_string())
        })?;
    let session = Session::create(&state.db, &user.username).await?;
    tracing::info!(username = %user.username, "User logged in by phone");

    hx_redirect("/", Some(session_cookie(&session.id, state.cookie_secure())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_e164() {
        assert!(is_e164("+886912345678"));
        assert!(is_e164("+12025550123"));
        assert!(!is_e164("0912345678"));
        assert!(!is_e164("+8869123"));
        assert!(!is_e164("+8869123456789012"));
        assert!(!is_e164("+88691234567a"));
        assert!(!is_e164(""));
    }

    #[test]
    fn test_is_verify_code() {
        assert!(is_verify_code("1234"));
        assert!(is_verify_code("123456"));
        assert!(is_verify_code("1234567890"));
        assert!(!is_verify_code("123"));
        assert!(!is_verify_code("12345678901"));
        assert!(!is_verify_code("12a4"));
    }
}
