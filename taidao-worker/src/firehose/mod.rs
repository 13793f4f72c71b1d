/// Bluesky firehose ingestion
///
/// Reads post commits from Jetstream and maintains the feed tables:
///
/// - `event`: wire model of Jetstream frames
/// - `cursor`: resume position, persisted to a file
/// - `indexer`: enrollment and post indexing rules
/// - `client`: websocket connection state machine

pub mod client;
pub mod cursor;
pub mod event;
pub mod indexer;

pub use client::{ConnectionState, Connector, FirehoseClient, FirehoseError, TungsteniteConnector};
pub use cursor::{CursorError, CursorStore, DEFAULT_CURSOR};
pub use indexer::{FeedIndexer, IndexOutcome, PostAction};
