/// Configuration for the worker
///
/// Loaded from environment variables, with a `.env` file read first when
/// present.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: SQLite URL shared with the API (default: `sqlite://db?mode=rwc`)
/// - `LOG_FILE`: Append logs to this file instead of stdout
/// - `JETSTREAM_URL`: Jetstream subscribe endpoint
/// - `CURSOR_FILE`: Where the firehose position is kept (default: `jetstream_cursor.txt`)
/// - `ENROLL_HASHTAG`: Text that enrolls an author in the feed (default: `#台灣人+1`)
/// - `RECONNECT_BACKOFF_SECS`: Wait between reconnect attempts (default: 5)
/// - `CURSOR_FLUSH_SECS`: How often the cursor is written out (default: 10)
/// - `RUST_LOG`: Log filter (default: taidao_worker=debug)

use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, time::Duration};

/// Public Jetstream instance
pub const DEFAULT_JETSTREAM_URL: &str = "wss://jetstream2.us-west.bsky.network/subscribe";

/// Hashtag that enrolls its author
pub const DEFAULT_ENROLL_HASHTAG: &str = "#台灣人+1";

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// SQLite connection URL
    pub database_url: String,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// Optional log file path
    pub log_file: Option<String>,

    /// Jetstream subscribe endpoint, without query
    pub jetstream_url: String,

    /// Cursor file path
    pub cursor_file: PathBuf,

    /// Enrollment hashtag
    pub enroll_hashtag: String,

    /// Fixed wait before reconnecting
    pub reconnect_backoff: Duration,

    /// Interval between cursor flushes
    pub cursor_flush_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://db?mode=rwc".to_string(),
            max_connections: 2,
            log_file: None,
            jetstream_url: DEFAULT_JETSTREAM_URL.to_string(),
            cursor_file: PathBuf::from("jetstream_cursor.txt"),
            enroll_hashtag: DEFAULT_ENROLL_HASHTAG.to_string(),
            reconnect_backoff: Duration::from_secs(5),
            cursor_flush_interval: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let reconnect_backoff = match env::var("RECONNECT_BACKOFF_SECS") {
            Ok(secs) => Duration::from_secs(secs.parse()?),
            Err(_) => defaults.reconnect_backoff,
        };
        let cursor_flush_interval = match env::var("CURSOR_FLUSH_SECS") {
            Ok(secs) => Duration::from_secs(secs.parse()?),
            Err(_) => defaults.cursor_flush_interval,
        };
        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(n) => n.parse()?,
            Err(_) => defaults.max_connections,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections,
            log_file: env::var("LOG_FILE").ok().filter(|v| !v.is_empty()),
            jetstream_url: env::var("JETSTREAM_URL").unwrap_or(defaults.jetstream_url),
            cursor_file: env::var("CURSOR_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.cursor_file),
            enroll_hashtag: env::var("ENROLL_HASHTAG").unwrap_or(defaults.enroll_hashtag),
            reconnect_backoff,
            cursor_flush_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(config.cursor_flush_interval, Duration::from_secs(10));
        assert_eq!(config.enroll_hashtag, "#台灣人+1");
        assert!(config.jetstream_url.starts_with("wss://"));
    }
}
