/// User model and database operations
///
/// Users are created by the email sign-up flow (username + email) or by the
/// phone login flow (username = phone number). Usernames starting with `+`
/// are reserved for phone accounts. There are no passwords; every
/// login goes through a one-time code.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     username TEXT PRIMARY KEY NOT NULL,
///     email TEXT UNIQUE,
///     phone TEXT UNIQUE,
///     created_at TEXT NOT NULL
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use taidao_shared::models::user::{NewUser, User};
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), sqlx::Error> {
/// let created = User::create(
///     &pool,
///     NewUser::with_email("alice", "alice@example.com"),
/// )
/// .await?;
///
/// if created {
///     let user = User::find_by_email(&pool, "alice@example.com").await?;
///     assert!(user.is_some());
/// }
/// # Ok(())
/// # }
/// ```

use crate::db::now_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};
use std::fmt;

/// User account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique username (phone number for phone-only accounts)
    pub username: String,

    /// Email address, unique when present
    pub email: Option<String>,

    /// E.164 phone number, unique when present
    pub phone: Option<String>,

    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl NewUser {
    /// Account created by the email sign-up flow
    pub fn with_email(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: Some(email.into()),
            phone: None,
        }
    }

    /// Account created by the phone login flow
    pub fn with_phone(phone: impl Into<String>) -> Self {
        let phone = phone.into();
        Self {
            username: phone.clone(),
            email: None,
            phone: Some(phone),
        }
    }
}

/// Field that collides with an existing account during sign-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictField {
    Username,
    Email,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictField::Username => write!(f, "username"),
            ConflictField::Email => write!(f, "email"),
        }
    }
}

/// Whether `username` belongs to the phone account namespace
pub fn is_reserved_username(username: &str) -> bool {
    username.starts_with('+')
}

impl User {
    /// Inserts a new user
    ///
    /// Accepts any executor so sign-up can insert inside a transaction.
    ///
    /// # Returns
    ///
    /// `true` if the row was inserted, `false` if the username, email or
    /// phone already belongs to another account
    pub async fn create<'e, E>(executor: E, data: NewUser) -> Result<bool, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, phone, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(data.username)
        .bind(data.email)
        .bind(data.phone)
        .bind(now_timestamp())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Finds a user by email address
    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT username, email, phone, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by phone number
    pub async fn find_by_phone(pool: &SqlitePool, phone: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT username, email, phone, created_at FROM users WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(pool)
        .await
    }

    /// Lists which sign-up fields are already taken
    ///
    /// The result is ordered username first, then email, and each field
    /// appears at most once.
    pub async fn find_conflicts(
        pool: &SqlitePool,
        username: &str,
        email: &str,
    ) -> Result<Vec<ConflictField>, sqlx::Error> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT username, email
            FROM users
            WHERE username = ? OR email = ?
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_all(pool)
        .await?;

        let username_taken = rows.iter().any(|(u, _)| u == username);
        let email_taken = rows.iter().any(|(_, e)| e.as_deref() == Some(email));

        let mut conflicts = Vec::new();
        if username_taken {
            conflicts.push(ConflictField::Username);
        }
        if email_taken {
            conflicts.push(ConflictField::Email);
        }

        Ok(conflicts)
    }

    /// Returns the account for a verified phone number, creating it on first login
    ///
    /// # Returns
    ///
    /// `None` when the number is already the username of an account that
    /// registered by email
    pub async fn ensure_phone_user(
        pool: &SqlitePool,
        phone: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        if let Some(user) = Self::find_by_phone(pool, phone).await? {
            return Ok(Some(user));
        }

        Self::create(pool, NewUser::with_phone(phone)).await?;

        // Also covers a concurrent first login inserting the same row
        Self::find_by_phone(pool, phone).await
    }

    /// Counts total number of users
    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}
