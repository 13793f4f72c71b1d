/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct. A `.env` file in the working directory
/// is read first when present.
///
/// # Environment Variables
///
/// - `HOST`: Host to bind to (default: 0.0.0.0)
/// - `PORT`: Port to bind to (default: 8080)
/// - `DATABASE_URL`: SQLite URL (default: `sqlite://db?mode=rwc`)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
/// - `LOG_FILE`: Append logs to this file instead of stdout
/// - `COOKIE_SECURE`: Mark the session cookie `Secure` (default: true)
/// - `FEED_SERVICE_DID`, `FEED_SERVICE_ENDPOINT`, `FEED_PUBLISHER_DID`,
///   `FEED_NAME`: Feed generator identity
/// - `BSKY_APPVIEW_URL`: Public AppView for profile lookups
/// - `MAIL_FROM`: Sender shown on verification emails
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_VERIFY_SERVICE_SID`:
///   Phone login (all three or none)
/// - `OPENAI_API_KEY`, `OPENAI_MODEL`: Chat relay
/// - `CWA_TOKEN`: Central Weather Administration open data
/// - `RUST_LOG`: Log filter (default: taidao_api=debug,tower_http=debug)
///
/// # Example
///
/// ```no_run
/// use taidao_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Bluesky feed generator identity
    pub feed: FeedConfig,

    /// Outgoing mail
    pub mail: MailConfig,

    /// Twilio Verify credentials, absent when phone login is disabled
    pub twilio: Option<TwilioConfig>,

    /// OpenAI credentials, absent when chat is disabled
    pub openai: Option<OpenAiConfig>,

    /// CWA open data token, absent when weather is disabled
    pub cwa_token: Option<String>,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Optional log file path
    pub log_file: Option<String>,

    /// Whether the session cookie carries the `Secure` attribute
    pub cookie_secure: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Feed generator identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// `did:web` of this service
    pub service_did: String,

    /// Public HTTPS origin of this service
    pub service_endpoint: String,

    /// DID of the account that published the feed record
    pub publisher_did: String,

    /// Record key of the feed generator record
    pub name: String,

    /// Base URL of the public Bluesky AppView
    pub appview_url: String,
}

impl FeedConfig {
    /// AT URI of the single feed this service serves
    pub fn feed_uri(&self) -> String {
        format!(
            "at://{}/app.bsky.feed.generator/{}",
            self.publisher_did, self.name
        )
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            service_did: "did:web:xn--kprw3s.tw".to_string(),
            service_endpoint: "https://xn--kprw3s.tw".to_string(),
            publisher_did: "did:plc:owthkwfcemjd2ydv42fvgsin".to_string(),
            name: "all-taiwanese".to_string(),
            appview_url: "https://public.api.bsky.app".to_string(),
        }
    }
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// `From` header for verification emails
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "台島 <no-reply@xn--kprw3s.tw>".to_string(),
        }
    }
}

/// Twilio Verify credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub verify_service_sid: String,
}

/// OpenAI chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Numeric or boolean variables have invalid values
    /// - Only some of the Twilio variables are set
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let host = var_or("HOST", "0.0.0.0");
        let port = var_or("PORT", "8080").parse::<u16>()?;
        let cookie_secure = var_or("COOKIE_SECURE", "true").parse::<bool>()?;

        let database_url = var_or("DATABASE_URL", "sqlite://db?mode=rwc");
        let max_connections = var_or("DATABASE_MAX_CONNECTIONS", "5").parse::<u32>()?;

        let feed_defaults = FeedConfig::default();
        let feed = FeedConfig {
            service_did: var_or("FEED_SERVICE_DID", &feed_defaults.service_did),
            service_endpoint: var_or("FEED_SERVICE_ENDPOINT", &feed_defaults.service_endpoint),
            publisher_did: var_or("FEED_PUBLISHER_DID", &feed_defaults.publisher_did),
            name: var_or("FEED_NAME", &feed_defaults.name),
            appview_url: var_or("BSKY_APPVIEW_URL", &feed_defaults.appview_url),
        };

        let twilio = match (
            optional_var("TWILIO_ACCOUNT_SID"),
            optional_var("TWILIO_AUTH_TOKEN"),
            optional_var("TWILIO_VERIFY_SERVICE_SID"),
        ) {
            (Some(account_sid), Some(auth_token), Some(verify_service_sid)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                verify_service_sid,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_VERIFY_SERVICE_SID must be set together"
            ),
        };

        let openai = optional_var("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
            api_key,
            model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
        });

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                log_file: optional_var("LOG_FILE"),
                cookie_secure,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            feed,
            mail: MailConfig {
                from: var_or("MAIL_FROM", &MailConfig::default().from),
            },
            twilio,
            openai,
            cwa_token: optional_var("CWA_TOKEN"),
        })
    }

    /// Configuration for tests: in-memory database, no external services
    pub fn for_tests() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                log_file: None,
                cookie_secure: false,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            feed: FeedConfig::default(),
            mail: MailConfig::default(),
            twilio: None,
            openai: None,
            cwa_token: None,
        }
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
