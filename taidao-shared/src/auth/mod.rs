/// Authentication primitives
///
/// Taidao has no passwords. Every login proves control of an email address
/// or a phone number with a one-time code, then receives a persisted session
/// whose random id travels in the `session` cookie.
///
/// # Modules
///
/// - [`session`]: Session id generation and cookie helpers
/// - [`otp`]: Six-digit one-time code generation and format checks
///
/// # Lifetimes
///
/// - Sessions live for [`SESSION_TTL`] (7 days)
/// - Email codes live for [`OTP_TTL`] (10 minutes)
///
/// # Example
///
/// ```
/// use taidao_shared::auth::otp::{generate_otp_code, is_valid_otp_code};
/// use taidao_shared::auth::session::{generate_session_id, session_cookie};
///
/// let code = generate_otp_code();
/// assert!(is_valid_otp_code(&code));
///
/// let cookie = session_cookie(&generate_session_id(), true);
/// assert!(cookie.starts_with("session="));
/// ```

pub mod otp;
pub mod session;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// How long a session stays valid after log-in
pub const SESSION_TTL: chrono::Duration = chrono::Duration::days(7);

/// How long an emailed code stays valid after it is issued
pub const OTP_TTL: chrono::Duration = chrono::Duration::minutes(10);
