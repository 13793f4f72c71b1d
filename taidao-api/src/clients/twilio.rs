/// Phone verification through Twilio Verify
///
/// Twilio generates, sends and checks the code; this service never sees it
/// until the user types it back. Only a check answered with `approved`
/// logs anyone in.
///
/// # Endpoints
///
/// - `POST {base}/v2/Services/{sid}/Verifications` with `To` and `Channel`
/// - `POST {base}/v2/Services/{sid}/VerificationCheck` with `To` and `Code`
///
/// Both use HTTP basic auth with the account SID and auth token.

use crate::config::TwilioConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Default Twilio Verify origin
pub const TWILIO_VERIFY_URL: &str = "https://verify.twilio.com";

/// Verification request or check failure
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Verify request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Verify returned status {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// How the code is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Outcome of checking a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Approved,
    Pending,
    Canceled,
    /// The check found no live verification: expired, already approved or
    /// locked out after too many attempts
    #[serde(skip)]
    NotFound,
    #[serde(other)]
    Other,
}

/// Sends and checks one-time codes for a phone number
#[async_trait]
pub trait OtpVerifier: Send + Sync {
    /// Asks the provider to send a code to `to`
    async fn start(&self, to: &str, channel: Channel) -> Result<(), VerifyError>;

    /// Checks the code the user entered
    async fn check(&self, to: &str, code: &str) -> Result<VerificationStatus, VerifyError>;
}

#[derive(Debug, Deserialize)]
struct VerificationResource {
    status: VerificationStatus,
}

/// Twilio Verify REST client
#[derive(Clone)]
pub struct TwilioVerify {
    client: reqwest::Client,
    base_url: String,
    config: TwilioConfig,
}

impl TwilioVerify {
    pub fn new(client: reqwest::Client, config: TwilioConfig) -> Self {
        Self::with_base_url(client, config, TWILIO_VERIFY_URL)
    }

    pub fn with_base_url(client: reqwest::Client, config: TwilioConfig, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    fn service_url(&self, resource: &str) -> String {
        format!(
            "{}/v2/Services/{}/{}",
            self.base_url, self.config.verify_service_sid, resource
        )
    }

    async fn post(
        &self,
        resource: &str,
        form: &[(&str, &str)],
    ) -> Result<VerificationResource, VerifyError> {
        let response = self
            .client
            .post(self.service_url(resource))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<VerificationResource>().await?)
    }
}

#[async_trait]
impl OtpVerifier for TwilioVerify {
    async fn start(&self, to: &str, channel: Channel) -> Result<(), VerifyError> {
        let channel = channel.to_string();
        let resource = self
            .post("Verifications", &[("To", to), ("Channel", &channel)])
            .await?;

        tracing::debug!(status = ?resource.status, "Verification started");
        Ok(())
    }

    async fn check(&self, to: &str, code: &str) -> Result<VerificationStatus, VerifyError> {
        match self
            .post("VerificationCheck", &[("To", to), ("Code", code)])
            .await
        {
            Ok(resource) => Ok(resource.status),
            Err(VerifyError::Upstream { status: 404, body }) => {
                tracing::debug!(body = %body, "No live verification to check");
                Ok(VerificationStatus::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}
