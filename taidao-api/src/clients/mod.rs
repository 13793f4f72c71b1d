/// Outbound integrations
///
/// Each external service sits behind a trait so handlers can be exercised
/// with in-process fakes:
///
/// - [`mailer`]: verification email ([`mailer::Mailer`])
/// - [`twilio`]: phone codes through Twilio Verify ([`twilio::OtpVerifier`])
/// - [`openai`]: streamed chat completions ([`openai::ChatUpstream`])
/// - [`bsky`]: Bluesky profiles ([`bsky::ProfileSource`])
/// - [`cwa`]: Central Weather Administration forecasts ([`cwa::WeatherSource`])

pub mod bsky;
pub mod cwa;
pub mod mailer;
pub mod openai;
pub mod twilio;
