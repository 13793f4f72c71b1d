/// Login sessions
///
/// A session row maps a random id (the `session` cookie value) to a
/// username. Sessions are never updated; they are deleted on log-out or by
/// the hourly sweep once older than [`SESSION_TTL`](crate::auth::SESSION_TTL).
/// Lookups also filter by age, so an expired row cannot authenticate even
/// before the sweep removes it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_log_in_sessions (
///     id TEXT PRIMARY KEY NOT NULL,
///     username TEXT NOT NULL REFERENCES users (username) ON DELETE CASCADE,
///     created_at TEXT NOT NULL
/// );
/// ```

use crate::auth::session::generate_session_id;
use crate::db::{cutoff_timestamp, now_timestamp, timestamp};
use crate::models::user::User;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

/// A persisted login session
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    /// Random URL-safe id, also the cookie value
    pub id: String,

    /// Owner of the session
    pub username: String,

    /// When the session was issued
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Issues a new session for `username`
    pub async fn create(pool: &SqlitePool, username: &str) -> Result<Self, sqlx::Error> {
        let id = generate_session_id();

        sqlx::query(
            r#"
            INSERT INTO user_log_in_sessions (id, username, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(username)
        .bind(now_timestamp())
        .execute(pool)
        .await?;

        tracing::debug!(username = %username, "Session created");

        sqlx::query_as::<_, Session>(
            "SELECT id, username, created_at FROM user_log_in_sessions WHERE id = ?",
        )
        .bind(&id)
        .fetch_one(pool)
        .await
    }

    /// Resolves a session id to its user
    ///
    /// # Returns
    ///
    /// `None` when the id is unknown or the session is older than `ttl`
    pub async fn find_user(
        pool: &SqlitePool,
        id: &str,
        ttl: chrono::Duration,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT users.username, users.email, users.phone, users.created_at
            FROM user_log_in_sessions
            JOIN users ON user_log_in_sessions.username = users.username
            WHERE user_log_in_sessions.id = ?
            AND user_log_in_sessions.created_at >= ?
            LIMIT 1
            "#,
        )
        .bind(id)
        .bind(cutoff_timestamp(ttl))
        .fetch_optional(pool)
        .await
    }

    /// Deletes every session belonging to `username`
    ///
    /// # Returns
    ///
    /// Number of sessions removed
    pub async fn delete_for_user(pool: &SqlitePool, username: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_log_in_sessions WHERE username = ?")
            .bind(username)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Deletes sessions created before `cutoff`
    ///
    /// # Returns
    ///
    /// Number of sessions removed
    pub async fn delete_expired(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_log_in_sessions WHERE created_at < ?")
            .bind(timestamp(cutoff))
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
