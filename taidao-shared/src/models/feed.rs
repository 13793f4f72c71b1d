/// Bluesky feed generator tables
///
/// - `bsky_feed_taiwanese_users`: members whose top-level posts make up the feed
/// - `bsky_feed_taiwanese_block_users`: DIDs that may never enroll
/// - `bsky_feed_taiwanese_posts`: indexed posts, served newest first
///
/// Posts are paged with a `createdAt::cid` cursor. Rows are ordered by
/// `created_at DESC, cid ASC`, and the next page starts strictly after the
/// last row of the previous one, so consecutive pages over a stable table
/// neither repeat nor skip rows.

use crate::db::now_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use thiserror::Error;

/// Separator between the two halves of a feed cursor
pub const CURSOR_SEPARATOR: &str = "::";

/// An indexed feed post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FeedPost {
    /// `at://{did}/app.bsky.feed.post/{rkey}`
    pub uri: String,

    /// Content id of the record
    pub cid: String,

    /// Normalized RFC 3339 UTC creation time from the record
    pub created_at: String,
}

/// Position in the feed: the `(created_at, cid)` of the last row served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: String,
    pub cid: String,
}

/// Cursor text that is not `createdAt::cid`
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Malformed feed cursor: {0}")]
pub struct CursorParseError(pub String);

impl FeedCursor {
    /// Parses a client-supplied cursor
    ///
    /// # Returns
    ///
    /// `Ok(None)` for an empty cursor or one with an empty half, which means
    /// "start from the newest post"
    ///
    /// # Errors
    ///
    /// Returns an error unless the text splits into exactly two parts
    pub fn parse(raw: &str) -> Result<Option<Self>, CursorParseError> {
        if raw.is_empty() {
            return Ok(None);
        }

        let parts: Vec<&str> = raw.split(CURSOR_SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(CursorParseError(raw.to_string()));
        }

        let (created_at, cid) = (parts[0], parts[1]);
        if created_at.is_empty() || cid.is_empty() {
            return Ok(None);
        }

        Ok(Some(FeedCursor {
            created_at: created_at.to_string(),
            cid: cid.to_string(),
        }))
    }

    /// Cursor pointing just past `post`
    pub fn after(post: &FeedPost) -> Self {
        FeedCursor {
            created_at: post.created_at.clone(),
            cid: post.cid.clone(),
        }
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.created_at, CURSOR_SEPARATOR, self.cid)
    }
}

impl FeedPost {
    /// Indexes a post; re-indexing the same uri is a no-op
    ///
    /// # Returns
    ///
    /// `true` if a new row was written
    pub async fn insert(pool: &SqlitePool, post: &FeedPost) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO bsky_feed_taiwanese_posts (uri, cid, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&post.uri)
        .bind(&post.cid)
        .bind(&post.created_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a post from the feed
    pub async fn delete_by_uri(pool: &SqlitePool, uri: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM bsky_feed_taiwanese_posts WHERE uri = ?")
            .bind(uri)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetches one page of the feed
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum rows to return
    /// * `cursor` - Position after which to start, `None` for the newest post
    pub async fn page(
        pool: &SqlitePool,
        limit: i64,
        cursor: Option<&FeedCursor>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match cursor {
            Some(cursor) => {
                sqlx::query_as::<_, FeedPost>(
                    r#"
                    SELECT uri, cid, created_at FROM bsky_feed_taiwanese_posts
                    WHERE created_at < ? OR (created_at = ? AND cid > ?)
                    ORDER BY created_at DESC, cid
                    LIMIT ?
                    "#,
                )
                .bind(&cursor.created_at)
                .bind(&cursor.created_at)
                .bind(&cursor.cid)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, FeedPost>(
                    r#"
                    SELECT uri, cid, created_at FROM bsky_feed_taiwanese_posts
                    ORDER BY created_at DESC, cid
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(pool)
                .await
            }
        }
    }
}

/// An enrolled feed member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FeedMember {
    pub did: String,
    pub created_at: DateTime<Utc>,
}

impl FeedMember {
    /// Enrolls a DID; enrolling twice is a no-op
    pub async fn enroll(pool: &SqlitePool, did: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO bsky_feed_taiwanese_users (did, created_at)
            VALUES (?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(did)
        .bind(now_timestamp())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All member DIDs, in no particular order
    pub async fn list_dids(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT did FROM bsky_feed_taiwanese_users")
            .fetch_all(pool)
            .await
    }

    /// Members ordered newest enrollment first
    pub async fn list_newest_first(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FeedMember>(
            r#"
            SELECT did, created_at FROM bsky_feed_taiwanese_users
            ORDER BY created_at DESC, did
            "#,
        )
        .fetch_all(pool)
        .await
    }
}

/// DIDs barred from enrolling
pub struct BlockedUser;

impl BlockedUser {
    pub async fn is_blocked(pool: &SqlitePool, did: &str) -> Result<bool, sqlx::Error> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM bsky_feed_taiwanese_block_users WHERE did = ?")
                .bind(did)
                .fetch_optional(pool)
                .await?;

        Ok(found.is_some())
    }

    pub async fn block(pool: &SqlitePool, did: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bsky_feed_taiwanese_block_users (did, created_at)
            VALUES (?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(did)
        .bind(now_timestamp())
        .execute(pool)
        .await?;

        Ok(())
    }
}
