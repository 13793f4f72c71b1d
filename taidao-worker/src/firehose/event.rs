/// Jetstream event model
///
/// Jetstream sends one JSON object per websocket text frame. Only `commit`
/// events on `app.bsky.feed.post` matter here; identity and account events
/// still carry `time_us` and move the cursor forward.
///
/// ```json
/// {
///   "did": "did:plc:abc",
///   "time_us": 1747670400123456,
///   "kind": "commit",
///   "commit": {
///     "rev": "3lp...",
///     "operation": "create",
///     "collection": "app.bsky.feed.post",
///     "rkey": "3lp...",
///     "record": {
///       "$type": "app.bsky.feed.post",
///       "createdAt": "2025-05-20T00:00:00.123Z",
///       "langs": ["zh"],
///       "text": "#台灣人+1"
///     },
///     "cid": "bafyrei..."
///   }
/// }
/// ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// Collection the feed indexes
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// One firehose event
#[derive(Debug, Clone, Deserialize)]
pub struct JetstreamEvent {
    /// Author of the change
    pub did: String,

    /// Server timestamp in microseconds, used as the resume cursor
    pub time_us: i64,

    /// `commit`, `identity` or `account`
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub commit: Option<Commit>,
}

/// Repository change
#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub rev: String,

    pub operation: Operation,

    pub collection: String,

    pub rkey: String,

    /// Present on create and update
    #[serde(default)]
    pub record: Option<PostRecord>,

    #[serde(default)]
    pub cid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Other,
}

/// `app.bsky.feed.post` record, limited to the fields the feed reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "$type", default)]
    pub record_type: String,

    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub langs: Vec<String>,

    #[serde(default)]
    pub text: String,

    /// Set when the post answers another post
    #[serde(default)]
    pub reply: Option<serde_json::Value>,
}

impl JetstreamEvent {
    /// The commit, if this is a commit event
    pub fn as_commit(&self) -> Option<&Commit> {
        if self.kind == "commit" {
            self.commit.as_ref()
        } else {
            None
        }
    }
}

impl Commit {
    /// `at://{did}/{collection}/{rkey}`
    pub fn uri(&self, did: &str) -> String {
        format!("at://{}/{}/{}", did, self.collection, self.rkey)
    }

    /// Post text, empty for deletes
    pub fn text(&self) -> &str {
        self.record.as_ref().map(|r| r.text.as_str()).unwrap_or("")
    }

    /// Whether the record replies to another post
    pub fn is_reply(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.reply.is_some())
    }
}

/// Normalizes a record `createdAt` to RFC 3339 UTC with milliseconds
///
/// Returns `None` when the value is not RFC 3339.
pub fn normalize_created_at(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
}
