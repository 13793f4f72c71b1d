/// Pending email verification codes
///
/// Two tables hold one-time codes sent by email:
///
/// - `user_sign_up_email_tokens`: keyed by `(username, email)`, proves the
///   address before the account exists
/// - `user_log_in_email_tokens`: keyed by `email`, logs an existing account in
///
/// Issuing a code for a key that already has one replaces the code and resets
/// its age, so there is never more than one pending code per identifier.
/// Codes older than [`OTP_TTL`](crate::auth::OTP_TTL) never match and are
/// removed by the per-minute sweep.

use crate::db::{cutoff_timestamp, now_timestamp, timestamp};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};

/// Sign-up verification code operations
pub struct SignUpToken;

impl SignUpToken {
    /// Stores `token` as the pending code for `(username, email)`
    pub async fn issue(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        token: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_sign_up_email_tokens (username, email, token, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (username, email)
            DO UPDATE SET token = excluded.token, created_at = excluded.created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(token)
        .bind(now_timestamp())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Checks whether `token` is the live code for `(username, email)`
    pub async fn matches(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        token: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM user_sign_up_email_tokens
            WHERE username = ?
            AND email = ?
            AND token = ?
            AND created_at >= ?
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(token)
        .bind(cutoff_timestamp(ttl))
        .fetch_optional(pool)
        .await?;

        Ok(found.is_some())
    }

    /// Removes the pending code for `(username, email)`
    pub async fn delete<'e, E>(executor: E, username: &str, email: &str) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query("DELETE FROM user_sign_up_email_tokens WHERE username = ? AND email = ?")
            .bind(username)
            .bind(email)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Deletes codes issued before `cutoff`
    pub async fn delete_expired(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sign_up_email_tokens WHERE created_at < ?")
            .bind(timestamp(cutoff))
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Log-in verification code operations
pub struct LogInToken;

impl LogInToken {
    /// Stores `token` as the pending code for `email`
    pub async fn issue(pool: &SqlitePool, email: &str, token: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_log_in_email_tokens (email, token, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (email)
            DO UPDATE SET token = excluded.token, created_at = excluded.created_at
            "#,
        )
        .bind(email)
        .bind(token)
        .bind(now_timestamp())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Resolves a live `(email, token)` pair to the account's username
    pub async fn find_username(
        pool: &SqlitePool,
        email: &str,
        token: &str,
        ttl: chrono::Duration,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT users.username
            FROM user_log_in_email_tokens
            JOIN users ON user_log_in_email_tokens.email = users.email
            WHERE user_log_in_email_tokens.email = ?
            AND user_log_in_email_tokens.token = ?
            AND user_log_in_email_tokens.created_at >= ?
            "#,
        )
        .bind(email)
        .bind(token)
        .bind(cutoff_timestamp(ttl))
        .fetch_optional(pool)
        .await
    }

    /// Removes the pending code for `email`
    pub async fn delete(pool: &SqlitePool, email: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_log_in_email_tokens WHERE email = ?")
            .bind(email)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Deletes codes issued before `cutoff`
    pub async fn delete_expired(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_log_in_email_tokens WHERE created_at < ?")
            .bind(timestamp(cutoff))
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
