/// Persistent firehose cursor
///
/// The cursor is the `time_us` of the last applied event, kept in memory and
/// written to a small text file as a decimal number. On restart the worker
/// resubscribes from the stored value, so events seen after the last flush
/// are replayed. Replays are harmless because every write the indexer makes
/// is idempotent.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Starting point for a fresh cursor file (2025-05-20T00:00:00Z)
pub const DEFAULT_CURSOR: i64 = 1_747_670_400_000_000;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("Cursor file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cursor file holds {0:?}, not a microsecond timestamp")]
    Invalid(String),
}

/// In-memory cursor backed by a file
#[derive(Debug)]
pub struct CursorStore {
    path: PathBuf,
    value: AtomicI64,
}

impl CursorStore {
    /// Opens the cursor file
    ///
    /// A missing or empty file starts at [`DEFAULT_CURSOR`], which is
    /// written back immediately.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or written, or holds something other
    /// than a decimal integer
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CursorError> {
        let path = path.as_ref().to_path_buf();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let trimmed = contents.trim();
        let store = if trimmed.is_empty() {
            let store = Self {
                path,
                value: AtomicI64::new(DEFAULT_CURSOR),
            };
            store.flush().await?;
            tracing::info!(cursor = DEFAULT_CURSOR, "Initialized cursor file");
            store
        } else {
            let value = trimmed
                .parse::<i64>()
                .map_err(|_| CursorError::Invalid(trimmed.to_string()))?;
            Self {
                path,
                value: AtomicI64::new(value),
            }
        };

        Ok(store)
    }

    /// Current cursor
    pub fn current(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Moves the cursor to `time_us` unless it already points later
    pub fn advance(&self, time_us: i64) {
        self.value.fetch_max(time_us, Ordering::SeqCst);
    }

    /// Writes the current cursor to disk
    ///
    /// The value goes to a sibling temp file first and is renamed into
    /// place, so a crash never leaves a truncated cursor behind.
    pub async fn flush(&self) -> Result<(), CursorError> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, self.current().to_string()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Flushes every `interval` until cancelled, then once more
    pub async fn run_flusher(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::error!(error = %e, "Failed to flush cursor");
                    }
                }
            }
        }

        match self.flush().await {
            Ok(()) => tracing::info!(cursor = self.current(), "Cursor flushed on shutdown"),
            Err(e) => tracing::error!(error = %e, "Failed to flush cursor on shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_starts_at_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.txt");

        let store = CursorStore::load(&path).await.unwrap();
        assert_eq!(store.current(), DEFAULT_CURSOR);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            DEFAULT_CURSOR.to_string()
        );
    }

    #[tokio::test]
    async fn test_empty_file_starts_at_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.txt");
        std::fs::write(&path, "").unwrap();

        let store = CursorStore::load(&path).await.unwrap();
        assert_eq!(store.current(), DEFAULT_CURSOR);
    }

    #[tokio::test]
    async fn test_existing_value_and_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.txt");

        std::fs::write(&path, "1747670500000000\n").unwrap();
        let store = CursorStore::load(&path).await.unwrap();
        assert_eq!(store.current(), 1_747_670_500_000_000);

        std::fs::write(&path, "not a number").unwrap();
        assert!(matches!(
            CursorStore::load(&path).await,
            Err(CursorError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_advance_never_moves_backwards() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.txt");
        let store = CursorStore::load(&path).await.unwrap();

        store.advance(DEFAULT_CURSOR + 10);
        store.advance(DEFAULT_CURSOR + 5);
        assert_eq!(store.current(), DEFAULT_CURSOR + 10);

        store.flush().await.unwrap();
        let reloaded = CursorStore::load(&path).await.unwrap();
        assert_eq!(reloaded.current(), DEFAULT_CURSOR + 10);
    }

    #[tokio::test]
    async fn test_flusher_writes_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.txt");
        let store = Arc::new(CursorStore::load(&path).await.unwrap());
        let cancel = CancellationToken::new();

        let flusher = tokio::spawn(
            store
                .clone()
                .run_flusher(Duration::from_secs(3600), cancel.clone()),
        );

        store.advance(DEFAULT_CURSOR + 42);
        cancel.cancel();
        flusher.await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            (DEFAULT_CURSOR + 42).to_string()
        );
    }
}
