/// Database models for Taidao
///
/// This module contains all database models and their queries.
///
/// # Models
///
/// - `user`: Accounts (email or phone based)
/// - `session`: Persisted login sessions behind the `session` cookie
/// - `email_token`: Pending sign-up and log-in codes sent by email
/// - `feed`: Bluesky feed posts, members and blocked DIDs
///
/// # Example
///
/// ```no_run
/// use taidao_shared::models::user::{NewUser, User};
/// use taidao_shared::models::session::Session;
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), sqlx::Error> {
/// User::create(&pool, NewUser::with_email("alice", "alice@example.com")).await?;
/// let session = Session::create(&pool, "alice").await?;
/// println!("cookie value: {}", session.id);
/// # Ok(())
/// # }
/// ```

pub mod email_token;
pub mod feed;
pub mod session;
pub mod user;
