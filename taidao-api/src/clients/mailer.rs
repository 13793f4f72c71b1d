/// Outgoing verification email
///
/// Handlers hand a finished message to a [`Mailer`]. Delivery itself sits
/// behind the trait; the bundled [`LogMailer`] writes the message to the
/// tracing log, which is enough for development and for operators who relay
/// the log elsewhere.

use async_trait::async_trait;
use thiserror::Error;

/// Mail delivery failure
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Subject line of every verification email
pub const VERIFICATION_SUBJECT: &str = "信箱驗證碼";

impl Message {
    /// Builds the verification email carrying `code`
    pub fn verification(from: &str, to: &str, code: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: VERIFICATION_SUBJECT.to_string(),
            html_body: format!(
                "<p>您的驗證碼是 <strong>{}</strong>，10 分鐘內有效。</p>",
                code
            ),
        }
    }
}

/// Sends email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), MailError>;
}

/// Mailer that only logs
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        tracing::info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.html_body,
            "Sending email"
        );
        Ok(())
    }
}
