//! # Taidao API Server
//!
//! Serves the Taidao web endpoints: email and phone log-in, the Bluesky
//! feed generator, the chat relay and CWA weather.
//!
//! ## Architecture
//!
//! The API server is built with Axum and provides:
//! - Session cookies backed by SQLite
//! - Per-route rate limiting on the one-time code endpoints
//! - SSE streaming for chat replies
//!
//! The firehose consumer and the expiry sweeps run in `taidao-worker`, which
//! shares the same SQLite file.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p taidao-api
//! ```

use std::time::Duration;
use taidao_api::{
    app::{build_router, AppState},
    config::Config,
};
use taidao_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    logging::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(
        "taidao_api=debug,tower_http=debug",
        config.api.log_file.as_deref(),
    )?;

    tracing::info!("Taidao API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("taidao/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool.clone(), config, http);
    tracing::info!(
        phone = state.verifier.is_some(),
        chat = state.chat.is_some(),
        weather = state.weather.is_some(),
        "Integrations configured"
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, exiting...");
}
