/// Email one-time code flows
///
/// Sign-up and log-in both mail a six-digit code that stays valid for ten
/// minutes. Issuing a new code replaces the previous one.
///
/// # Endpoints
///
/// - `POST /sign-up-by-email/` - Send a sign-up code
/// - `POST /verify-sign-up-email/` - Create the account and log in
/// - `POST /log-in-by-email/` - Send a log-in code
/// - `POST /verify-log-in-email/` - Log in
///
/// All four take `application/x-www-form-urlencoded` bodies and answer with
/// `303 See Other` plus an `HX-Redirect` header.

use super::{hx_redirect, with_query};
use crate::{
    app::AppState,
    clients::mailer::Message,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, response::Response, Form};
use serde::Deserialize;
use taidao_shared::{
    auth::{
        otp::{generate_otp_code, is_valid_otp_code},
        session::session_cookie,
        OTP_TTL,
    },
    models::{
        email_token::{LogInToken, SignUpToken},
        session::Session,
        user::{is_reserved_username, NewUser, User},
    },
};
use validator::Validate;

/// Malformed, wrong and expired codes all look the same to the client
fn code_not_found() -> ApiError {
    ApiError::NotFound("Verification code is invalid or expired".to_string())
}

/// Sign-up form
#[derive(Debug, Deserialize, Validate)]
pub struct SignUpForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "Username must be 1 to 32 characters"))]
    pub username: String,

    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Sign-up verification form
#[derive(Debug, Deserialize)]
pub struct VerifySignUpForm {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub token: String,
}

/// Log-in form
#[derive(Debug, Deserialize, Validate)]
pub struct LogInForm {
    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Log-in verification form
#[derive(Debug, Deserialize)]
pub struct VerifyLogInForm {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub token: String,
}

/// Mails `code` to `to`
///
/// Delivery failures are logged and otherwise ignored; the user can ask for
/// a new code.
async fn send_code(state: &AppState, to: &str, code: &str) {
    let message = Message::verification(&state.config.mail.from, to, code);
    if let Err(e) = state.mailer.send(message).await {
        tracing::warn!(to = %to, error = %e, "Failed to send verification email");
    }
}

/// Starts a sign-up
///
/// # Errors
///
/// - `400 Bad Request`: Invalid email, or a username that is empty, too long
///   or starts with `+`
/// - `409 Conflict`: Username and/or email taken; the message lists the
///   taken fields, e.g. `username,email`
pub async fn sign_up_by_email(
    State(state): State<AppState>,
    Form(form): Form<SignUpForm>,
) -> ApiResult<Response> {
    form.validate()?;
    if is_reserved_username(&form.username) {
        return Err(ApiError::BadRequest(
            "Username cannot start with +".to_string(),
        ));
    }

    let conflicts = User::find_conflicts(&state.db, &form.username, &form.email).await?;
    if !conflicts.is_empty() {
        let fields: Vec<String> = conflicts.iter().map(ToString::to_string).collect();
        return Err(ApiError::Conflict(fields.join(",")));
    }

    let code = generate_otp_code();
    SignUpToken::issue(&state.db, &form.username, &form.email, &code).await?;
    send_code(&state, &form.email, &code).await;

    tracing::info!(username = %form.username, "Sign-up code issued");

    let location = with_query(
        "/verify-sign-up-email/",
        &[("username", &form.username), ("email", &form.email)],
    )?;
    hx_redirect(&location, None)
}

/// Completes a sign-up
///
/// The account insert and the code removal commit together.
///
/// # Errors
///
/// - `404 Not Found`: No live code matches
/// - `409 Conflict`: The username or email was taken in the meantime
pub async fn verify_sign_up_email(
    State(state): State<AppState>,
    Form(form): Form<VerifySignUpForm>,
) -> ApiResult<Response> {
    if !is_valid_otp_code(&form.token) {
        return Err(code_not_found());
    }

    let matched = SignUpToken::matches(
        &state.db,
        &form.username,
        &form.email,
        &form.token,
        OTP_TTL,
    )
    .await?;
    if !matched {
        return Err(code_not_found());
    }

    let mut tx = state.db.begin().await?;

    let created = User::create(
        &mut *tx,
        NewUser::with_email(form.username.as_str(), form.email.as_str()),
    )
    .await?;
    if !created {
        return Err(ApiError::Conflict("username,email".to_string()));
    }

    SignUpToken::delete(&mut *tx, &form.username, &form.email).await?;
    tx.commit().await?;

    let session = Session::create(&state.db, &form.username).await?;
    tracing::info!(username = %form.username, "User signed up");

    hx_redirect("/", Some(session_cookie(&session.id, state.cookie_secure())))
}

/// Starts an email log-in
///
/// # Errors
///
/// - `400 Bad Request`: Invalid email
/// - `404 Not Found`: No account uses this email
pub async fn log_in_by_email(
    State(state): State<AppState>,
    Form(form): Form<LogInForm>,
) -> ApiResult<Response> {
    form.validate()?;

    if User::find_by_email(&state.db, &form.email).await?.is_none() {
        return Err(ApiError::NotFound("No account uses this email".to_string()));
    }

    let code = generate_otp_code();
    LogInToken::issue(&state.db, &form.email, &code).await?;
    send_code(&state, &form.email, &code).await;

    let location = with_query("/verify-log-in-email/", &[("email", &form.email)])?;
    hx_redirect(&location, None)
}

/// Completes an email log-in
///
/// # Errors
///
/// - `404 Not Found`: No live code matches
pub async fn verify_log_in_email(
    State(state): State<AppState>,
    Form(form): Form<VerifyLogInForm>,
) -> ApiResult<Response> {
    if !is_valid_otp_code(&form.token) {
        return Err(code_not_found());
    }

    let username = LogInToken::find_username(&state.db, &form.email, &form.token, OTP_TTL)
        .await?
        .ok_or_else(code_not_found)?;

    LogInToken::delete(&state.db, &form.email).await?;

    let session = Session::create(&state.db, &username).await?;
    tracing::info!(username = %username, "User logged in by email");

    hx_redirect("/", Some(session_cookie(&session.id, state.cookie_secure())))
}
