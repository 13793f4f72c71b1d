/// Jetstream websocket client
///
/// The client is a small state machine:
///
/// ```text
///             dial ok                read error / close
/// Connecting ---------> Streaming -----------------------+
///     |  ^                                               |
///     |  |  backoff elapsed                              v
///     |  +--------------------------------------------- Backoff
///     |                                                  ^
///     +------------------- dial error ------------------+
/// ```
///
/// Retries are unbounded with a fixed backoff. Each dial resumes from the
/// cursor, and the cursor only advances after an event has been applied, so
/// a reconnect never skips an unprocessed event.

use super::{
    cursor::CursorStore,
    event::{JetstreamEvent, POST_COLLECTION},
    indexer::FeedIndexer,
};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Text frames from one websocket session
pub type MessageStream = BoxStream<'static, Result<String, FirehoseError>>;

#[derive(Debug, Error)]
pub enum FirehoseError {
    #[error("Websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection refused: {0}")]
    Refused(String),
}

/// Opens websocket sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<MessageStream, FirehoseError>;
}

/// Production connector over `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<MessageStream, FirehoseError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;

        let frames = socket.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(FirehoseError::from(e))),
            }
        });

        Ok(frames.boxed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Streaming,
    Backoff,
}

/// Consumes the firehose into the feed tables
pub struct FirehoseClient<C> {
    connector: C,
    base_url: String,
    backoff: Duration,
    cursor: Arc<CursorStore>,
    indexer: FeedIndexer,
    state: ConnectionState,
}

impl<C: Connector> FirehoseClient<C> {
    pub fn new(
        connector: C,
        base_url: impl Into<String>,
        backoff: Duration,
        cursor: Arc<CursorStore>,
        indexer: FeedIndexer,
    ) -> Self {
        Self {
            connector,
            base_url: base_url.into(),
            backoff,
            cursor,
            indexer,
            state: ConnectionState::Connecting,
        }
    }

    /// Subscribe URL resuming at the current cursor
    pub fn subscribe_url(&self) -> String {
        format!(
            "{}?wantedCollections={}&cursor={}",
            self.base_url,
            POST_COLLECTION,
            self.cursor.current()
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::debug!(from = ?self.state, to = ?next, "Firehose state change");
        self.state = next;
    }

    /// Runs until `cancel` fires, returning the indexer
    pub async fn run(mut self, cancel: CancellationToken) -> FeedIndexer {
        let mut session: Option<MessageStream> = None;

        loop {
            match self.state {
                ConnectionState::Connecting => {
                    let url = self.subscribe_url();
                    tracing::info!(url = %url, "Connecting to Jetstream");

                    let dialed = tokio::select! {
                        _ = cancel.cancelled() => break,
                        dialed = self.connector.connect(&url) => dialed,
                    };

                    match dialed {
                        Ok(stream) => {
                            session = Some(stream);
                            self.transition(ConnectionState::Streaming);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Jetstream dial failed");
                            self.transition(ConnectionState::Backoff);
                        }
                    }
                }
                ConnectionState::Streaming => {
                    let Some(stream) = session.as_mut() else {
                        self.transition(ConnectionState::Connecting);
                        continue;
                    };

                    let frame = tokio::select! {
                        _ = cancel.cancelled() => break,
                        frame = stream.next() => frame,
                    };

                    match frame {
                        Some(Ok(text)) => self.handle_frame(&text).await,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Jetstream read failed");
                            session = None;
                            self.transition(ConnectionState::Backoff);
                        }
                        None => {
                            tracing::warn!("Jetstream closed the connection");
                            session = None;
                            self.transition(ConnectionState::Backoff);
                        }
                    }
                }
                ConnectionState::Backoff => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.backoff) => {
                            self.transition(ConnectionState::Connecting);
                        }
                    }
                }
            }
        }

        tracing::info!(cursor = self.cursor.current(), "Firehose stopped");
        self.indexer
    }

    /// Applies one frame, then moves the cursor past it
    async fn handle_frame(&mut self, text: &str) {
        let event: JetstreamEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable Jetstream frame");
                return;
            }
        };

        match self.indexer.apply(&event).await {
            Ok(outcome) if outcome.enrolled || outcome.post != Default::default() => {
                tracing::debug!(did = %event.did, outcome = ?outcome, "Event applied");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(did = %event.did, error = %e, "Failed to apply event, skipping");
            }
        }

        self.cursor.advance(event.time_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firehose::cursor::DEFAULT_CURSOR;
    use crate::testing::migrated_pool;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use taidao_shared::models::feed::{FeedMember, FeedPost};
    use tempfile::TempDir;

    /// One scripted websocket session
    enum Script {
        Refuse,
        Frames(Vec<Result<String, FirehoseError>>),
    }

    /// Connector that replays scripts and cancels once they run out
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<Script>>,
        dialed: Arc<Mutex<Vec<String>>>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, url: &str) -> Result<MessageStream, FirehoseError> {
            self.dialed.lock().unwrap().push(url.to_string());

            match self.scripts.lock().unwrap().pop_front() {
                Some(Script::Frames(frames)) => Ok(stream::iter(frames).boxed()),
                Some(Script::Refuse) => Err(FirehoseError::Refused("scripted".to_string())),
                None => {
                    self.cancel.cancel();
                    Err(FirehoseError::Refused("done".to_string()))
                }
            }
        }
    }

    fn frame(did: &str, rkey: &str, text: &str, time_us: i64) -> Result<String, FirehoseError> {
        Ok(serde_json::json!({
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
        })
        .to_string())
    }

    fn cursor_of(url: &str) -> i64 {
        url.rsplit("cursor=").next().unwrap().parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resumes_from_last_applied_event() {
        let dir = TempDir::new().unwrap();
        let pool = migrated_pool().await;
        let cursor = Arc::new(CursorStore::load(dir.path().join("cursor")).await.unwrap());
        let indexer = FeedIndexer::load(pool.clone(), "#台灣人+1").await.unwrap();

        let t = DEFAULT_CURSOR;
        let cancel = CancellationToken::new();
        let dialed = Arc::new(Mutex::new(Vec::new()));
        let connector = ScriptedConnector {
            scripts: Mutex::new(VecDeque::from(vec![
                Script::Frames(vec![
                    frame("did:plc:a", "1", "#台灣人+1", t + 100),
                    frame("did:plc:a", "2", "第二篇", t + 200),
                    Err(FirehoseError::Refused("connection reset".to_string())),
                ]),
                Script::Refuse,
                Script::Frames(vec![
                    Ok("not json".to_string()),
                    frame("did:plc:a", "3", "第三篇", t + 300),
                ]),
            ])),
            dialed: dialed.clone(),
            cancel: cancel.clone(),
        };

        let client = FirehoseClient::new(
            connector,
            "wss://jetstream.test/subscribe",
            Duration::from_secs(5),
            cursor.clone(),
            indexer,
        );
        assert_eq!(client.state(), ConnectionState::Connecting);

        let indexer = client.run(cancel).await;

        let dialed = dialed.lock().unwrap().clone();
        assert_eq!(dialed.len(), 4);
        assert!(dialed[0].starts_with(
            "wss://jetstream.test/subscribe?wantedCollections=app.bsky.feed.post&cursor="
        ));
        assert_eq!(cursor_of(&dialed[0]), t);
        // Resumes at the last applied event, before the first unprocessed one
        assert_eq!(cursor_of(&dialed[1]), t + 200);
        assert_eq!(cursor_of(&dialed[2]), t + 200);
        assert_eq!(cursor_of(&dialed[3]), t + 300);
        assert_eq!(cursor.current(), t + 300);

        assert!(indexer.is_member("did:plc:a"));
        assert_eq!(FeedMember::list_dids(&pool).await.unwrap().len(), 1);
        assert_eq!(FeedPost::page(&pool, 10, None).await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_promptly() {
        let dir = TempDir::new().unwrap();
        let pool = migrated_pool().await;
        let cursor = Arc::new(CursorStore::load(dir.path().join("cursor")).await.unwrap());
        let indexer = FeedIndexer::load(pool, "#台灣人+1").await.unwrap();

        let cancel = CancellationToken::new();
        let connector = ScriptedConnector {
            scripts: Mutex::new(VecDeque::from(vec![Script::Refuse])),
            dialed: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
        };

        let client = FirehoseClient::new(
            connector,
            "wss://jetstream.test/subscribe",
            Duration::from_secs(3600),
            cursor,
            indexer,
        );

        let handle = tokio::spawn(client.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let indexer = handle.await.unwrap();
        assert_eq!(indexer.member_count(), 0);
    }
}
