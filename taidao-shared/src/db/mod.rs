/// Database layer for Taidao
///
/// This module provides the SQLite connection pool, migrations, and the
/// timestamp encoding shared by every table.
///
/// # Modules
///
/// - `pool`: SQLite connection pool with per-connection pragmas
/// - `migrations`: Embedded migration runner
/// - Models are in the `models` module at crate root level
///
/// # Timestamps
///
/// Every `created_at` column stores RFC 3339 UTC text with a fixed
/// microsecond width (`2025-05-20T01:02:03.000000Z`). The fixed width keeps
/// lexicographic order equal to chronological order, which the TTL sweeps
/// and the feed pagination rely on.

pub mod migrations;
pub mod pool;

use chrono::{DateTime, SecondsFormat, Utc};

/// Encodes a timestamp for a `created_at` column
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encodes the current time for a `created_at` column
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Encodes the oldest `created_at` still inside `ttl`
pub fn cutoff_timestamp(ttl: chrono::Duration) -> String {
    timestamp(Utc::now() - ttl)
}
