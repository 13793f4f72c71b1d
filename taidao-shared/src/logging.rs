/// Tracing setup shared by both binaries
///
/// Installs a `tracing-subscriber` registry with an `EnvFilter` (from
/// `RUST_LOG`, falling back to the binary's default directives) and one fmt
/// layer. When `LOG_FILE` is configured the fmt layer appends to that file
/// without ANSI colours instead of writing to stdout.

use anyhow::Context;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber
///
/// # Arguments
///
/// * `default_filter` - Directives used when `RUST_LOG` is unset,
///   e.g. `"taidao_api=debug,tower_http=debug"`
/// * `log_file` - Optional path to append log lines to
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed
pub fn init_tracing(default_filter: &str, log_file: Option<&str>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;

            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()?;
        }
        None => {
            registry.with(tracing_subscriber::fmt::layer()).try_init()?;
        }
    }

    Ok(())
}
