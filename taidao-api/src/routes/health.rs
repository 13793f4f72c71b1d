/// Health check endpoint
///
/// Provides a simple health check endpoint that verifies:
/// - The server is running
/// - Database connectivity
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "pool": { "active": 0, "idle": 1, "total": 1 },
///   "integrations": { "phone": false, "chat": true, "weather": true }
/// }
/// ```

use crate::app::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use taidao_shared::db::pool::{get_pool_stats, health_check as database_health};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,

    /// Connection pool usage
    pub pool: PoolUsage,

    /// Which optional integrations are configured
    pub integrations: Integrations,
}

/// Connection counts from the pool
#[derive(Debug, Serialize, Deserialize)]
pub struct PoolUsage {
    pub active: usize,
    pub idle: usize,
    pub total: usize,
}

/// Configured optional integrations
#[derive(Debug, Serialize, Deserialize)]
pub struct Integrations {
    pub phone: bool,
    pub chat: bool,
    pub weather: bool,
}

/// Health check handler
///
/// A broken database degrades the status instead of failing the request.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_status = match database_health(&state.db).await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "disconnected"
        }
    };

    let stats = get_pool_stats(&state.db);

    Json(HealthResponse {
        status: if database_status == "connected" {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database_status.to_string(),
        pool: PoolUsage {
            active: stats.active_connections,
            idle: stats.idle_connections,
            total: stats.total_connections,
        },
        integrations: Integrations {
            phone: state.verifier.is_some(),
            chat: state.chat.is_some(),
            weather: state.weather.is_some(),
        },
    })
}
