//! # Taidao Shared Library
//!
//! This crate contains the storage layer and authentication primitives used
//! by both the Taidao API server and the firehose worker.
//!
//! ## Module Organization
//!
//! - `db`: SQLite pool, migrations and timestamp encoding
//! - `models`: Users, sessions, email codes and Bluesky feed tables
//! - `auth`: Session ids, cookies and one-time codes
//! - `logging`: Tracing subscriber setup

pub mod auth;
pub mod db;
pub mod logging;
pub mod models;

/// Helpers for unit tests that need a real schema
#[cfg(test)]
pub(crate) mod testing {
    use crate::db::migrations::run_migrations;
    use crate::db::pool::{create_pool, DatabaseConfig};
    use crate::db::timestamp;
    use chrono::Utc;
    use sqlx::SqlitePool;

    /// Fresh in-memory database with every migration applied
    pub async fn migrated_pool() -> SqlitePool {
        let pool = create_pool(DatabaseConfig::in_memory())
            .await
            .expect("in-memory pool");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    /// Moves a row's `created_at` into the past by `age`
    pub async fn backdate(
        pool: &SqlitePool,
        table: &str,
        key_column: &str,
        key_value: &str,
        age: chrono::Duration,
    ) {
        let sql = format!(
            "UPDATE {} SET created_at = ? WHERE {} = ?",
            table, key_column
        );
        sqlx::query(&sql)
            .bind(timestamp(Utc::now() - age))
            .bind(key_value)
            .execute(pool)
            .await
            .expect("backdate row");
    }
}
