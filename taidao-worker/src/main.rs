//! # Taidao Worker
//!
//! Background process for Taidao, run beside the API server.
//!
//! ## Architecture
//!
//! The worker:
//! - Consumes the Bluesky Jetstream firehose into the feed tables
//! - Persists the firehose cursor every few seconds and on shutdown
//! - Sweeps expired sessions hourly and expired email codes every minute
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p taidao-worker
//! ```

use std::sync::Arc;
use taidao_shared::db::migrations::run_migrations;
use taidao_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use taidao_shared::logging::init_tracing;
use taidao_worker::config::WorkerConfig;
use taidao_worker::firehose::{CursorStore, FeedIndexer, FirehoseClient, TungsteniteConnector};
use taidao_worker::sweeper::Sweeper;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    init_tracing("taidao_worker=debug", config.log_file.as_deref())?;

    tracing::info!("Taidao Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let cursor = Arc::new(CursorStore::load(&config.cursor_file).await?);
    tracing::info!(
        cursor = cursor.current(),
        path = %config.cursor_file.display(),
        "Loaded firehose cursor"
    );
    let indexer = FeedIndexer::load(pool.clone(), config.enroll_hashtag.clone()).await?;

    let cancel = CancellationToken::new();

    let flusher = tokio::spawn(
        cursor
            .clone()
            .run_flusher(config.cursor_flush_interval, cancel.clone()),
    );
    let sweeper = tokio::spawn(Sweeper::new(pool.clone()).run(cancel.clone()));
    let firehose = tokio::spawn(
        FirehoseClient::new(
            TungsteniteConnector,
            config.jetstream_url.clone(),
            config.reconnect_backoff,
            cursor.clone(),
            indexer,
        )
        .run(cancel.clone()),
    );

    tracing::info!("Worker running");

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping...");
    cancel.cancel();

    match firehose.await {
        Ok(indexer) => tracing::info!(members = indexer.member_count(), "Firehose joined"),
        Err(e) => tracing::error!(error = %e, "Firehose task failed"),
    }
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "Sweeper task failed");
    }
    if let Err(e) = flusher.await {
        tracing::error!(error = %e, "Cursor flusher task failed");
    }
    // The firehose may apply one more event after the flusher's last write
    if let Err(e) = cursor.flush().await {
        tracing::error!(error = %e, "Final cursor flush failed");
    }

    close_pool(pool).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
