//! # Taidao Worker Library
//!
//! Background processing that runs beside the API server against the same
//! SQLite file.
//!
//! ## Modules
//!
//! - `config`: Environment configuration
//! - `firehose`: Jetstream consumer feeding the Bluesky feed tables
//! - `sweeper`: Removal of expired sessions and email codes

pub mod config;
pub mod firehose;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::SqlitePool;
    use taidao_shared::db::migrations::run_migrations;
    use taidao_shared::db::pool::{create_pool, DatabaseConfig};

    /// Fresh in-memory database with every migration applied
    pub async fn migrated_pool() -> SqlitePool {
        let pool = create_pool(DatabaseConfig::in_memory())
            .await
            .expect("in-memory pool");
        run_migrations(&pool).await.expect("migrations");
        pool
    }
}
