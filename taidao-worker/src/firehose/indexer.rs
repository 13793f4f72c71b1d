/// Feed indexing rules
///
/// For every post commit:
///
/// 1. Text containing the enrollment hashtag enrolls its author, unless the
///    author is blocked.
/// 2. Top-level posts by members are added to the feed on create and removed
///    on delete. Replies never enter the feed.
///
/// The member set is loaded once at startup and grows as authors enroll.
/// Every write is idempotent, so replaying events after a restart changes
/// nothing.

use super::event::{normalize_created_at, JetstreamEvent, Operation, POST_COLLECTION};
use sqlx::SqlitePool;
use std::collections::HashSet;
use taidao_shared::models::feed::{BlockedUser, FeedMember, FeedPost};

/// What happened to the feed's post table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostAction {
    #[default]
    None,
    Indexed,
    Deleted,
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    /// The author was newly enrolled
    pub enrolled: bool,

    /// The author used the hashtag but is blocked
    pub blocked: bool,

    pub post: PostAction,
}

/// Applies firehose events to the feed tables
pub struct FeedIndexer {
    db: SqlitePool,
    hashtag: String,
    members: HashSet<String>,
}

impl FeedIndexer {
    /// Creates an indexer, loading current members from the database
    pub async fn load(db: SqlitePool, hashtag: impl Into<String>) -> Result<Self, sqlx::Error> {
        let members: HashSet<String> = FeedMember::list_dids(&db).await?.into_iter().collect();
        tracing::info!(members = members.len(), "Loaded feed members");

        Ok(Self {
            db,
            hashtag: hashtag.into(),
            members,
        })
    }

    pub fn is_member(&self, did: &str) -> bool {
        self.members.contains(did)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Applies one event
    ///
    /// # Errors
    ///
    /// Returns the first database error; the event should then be treated
    /// as skipped
    pub async fn apply(&mut self, event: &JetstreamEvent) -> Result<IndexOutcome, sqlx::Error> {
        let mut outcome = IndexOutcome::default();

        let Some(commit) = event.as_commit() else {
            return Ok(outcome);
        };
        if commit.collection != POST_COLLECTION {
            return Ok(outcome);
        }

        if commit.text().contains(&self.hashtag) {
            if BlockedUser::is_blocked(&self.db, &event.did).await? {
                outcome.blocked = true;
                return Ok(outcome);
            }

            FeedMember::enroll(&self.db, &event.did).await?;
            if self.members.insert(event.did.clone()) {
                outcome.enrolled = true;
                tracing::info!(did = %event.did, "New feed member");
            }
        }

        if !self.is_member(&event.did) || commit.is_reply() {
            return Ok(outcome);
        }

        let uri = commit.uri(&event.did);
        match commit.operation {
            Operation::Create => {
                let record = commit.record.as_ref();
                let created_at = record
                    .and_then(|r| r.created_at.as_deref())
                    .and_then(normalize_created_at);
                let (Some(created_at), Some(cid)) = (created_at, commit.cid.as_ref()) else {
                    tracing::warn!(uri = %uri, "Post without a valid createdAt or cid, skipping");
                    return Ok(outcome);
                };

                FeedPost::insert(
                    &self.db,
                    &FeedPost {
                        uri,
                        cid: cid.clone(),
                        created_at,
                    },
                )
                .await?;
                outcome.post = PostAction::Indexed;
            }
            Operation::Delete => {
                FeedPost::delete_by_uri(&self.db, &uri).await?;
                outcome.post = PostAction::Deleted;
            }
            Operation::Update | Operation::Other => {}
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::migrated_pool;

    const HASHTAG: &str = "#台灣人+1";

    fn post_event(did: &str, rkey: &str, text: &str, time_us: i64) -> JetstreamEvent {
        serde_json::from_value(serde_json::json!({
            "did": did,
            "time_us": time_us,
            "kind": "commit",
            "commit": {
                "rev": "r",
                "operation": "create",
                "collection": "app.bsky.feed.post",
                "rkey": rkey,
                "record": {
                    "$type": "app.bsky.feed.post",
                    "createdAt": "2025-05-20T00:00:00.000Z",
                    "text": text
                },
                "cid": format!("bafy{}", rkey)
            }
        }))
        .unwrap()
    }

    fn reply_event(did: &str, rkey: &str) -> JetstreamEvent {
        let mut event = post_event(did, rkey, "回覆", 1);
        if let Some(record) = event.commit.as_mut().and_then(|c| c.record.as_mut()) {
            record.reply = Some(serde_json::json!({"parent": {"uri": "at://x"}}));
        }
        event
    }

    fn delete_event(did: &str, rkey: &str) -> JetstreamEvent {
        serde_json::from_value(serde_json::json!({
            "did": did,
            "time_us": 2,
            "kind": "commit",
            "commit": {
                "operation": "delete",
                "collection": "app.bsky.feed.post",
                "rkey": rkey
            }
        }))
        .unwrap()
    }

    async fn post_count(pool: &SqlitePool) -> usize {
        FeedPost::page(pool, 100, None).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_hashtag_enrolls_and_indexes_the_post() {
        let pool = migrated_pool().await;
        let mut indexer = FeedIndexer::load(pool.clone(), HASHTAG).await.unwrap();

        let outcome = indexer
            .apply(&post_event("did:plc:a", "1", "我是 #台灣人+1", 1))
            .await
            .unwrap();
        assert!(outcome.enrolled);
        assert_eq!(outcome.post, PostAction::Indexed);
        assert!(indexer.is_member("did:plc:a"));
        assert_eq!(FeedMember::list_dids(&pool).await.unwrap(), vec!["did:plc:a"]);

        // Enrolling again is not news
        let outcome = indexer
            .apply(&post_event("did:plc:a", "2", "#台灣人+1", 2))
            .await
            .unwrap();
        assert!(!outcome.enrolled);
        assert_eq!(post_count(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_non_members_and_replies_are_ignored() {
        let pool = migrated_pool().await;
        let mut indexer = FeedIndexer::load(pool.clone(), HASHTAG).await.unwrap();

        let outcome = indexer
            .apply(&post_event("did:plc:stranger", "1", "hello", 1))
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::default());

        FeedMember::enroll(&pool, "did:plc:member").await.unwrap();
        let mut indexer = FeedIndexer::load(pool.clone(), HASHTAG).await.unwrap();
        let outcome = indexer.apply(&reply_event("did:plc:member", "2")).await.unwrap();
        assert_eq!(outcome.post, PostAction::None);
        assert_eq!(post_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_blocked_author_cannot_enroll() {
        let pool = migrated_pool().await;
        BlockedUser::block(&pool, "did:plc:spam").await.unwrap();
        let mut indexer = FeedIndexer::load(pool.clone(), HASHTAG).await.unwrap();

        let outcome = indexer
            .apply(&post_event("did:plc:spam", "1", "#台灣人+1", 1))
            .await
            .unwrap();
        assert!(outcome.blocked);
        assert!(!indexer.is_member("did:plc:spam"));
        assert_eq!(post_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_delete_removes_post() {
        let pool = migrated_pool().await;
        FeedMember::enroll(&pool, "did:plc:member").await.unwrap();
        let mut indexer = FeedIndexer::load(pool.clone(), HASHTAG).await.unwrap();
        assert_eq!(indexer.member_count(), 1);

        indexer
            .apply(&post_event("did:plc:member", "1", "早安", 1))
            .await
            .unwrap();
        assert_eq!(post_count(&pool).await, 1);

        let outcome = indexer
            .apply(&delete_event("did:plc:member", "1"))
            .await
            .unwrap();
        assert_eq!(outcome.post, PostAction::Deleted);
        assert_eq!(post_count(&pool).await, 0);
    }
}
