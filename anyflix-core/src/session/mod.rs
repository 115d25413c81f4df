//! Per-content streaming sessions.
//!
//! A `Session` exclusively owns one swarm handle. Requests share it through
//! `Arc<Session>` and every suspension point (metadata, piece availability)
//! races the caller's cancellation token and the session's own teardown
//! token, so neither an abandoned request nor a dropped session leaves a
//! worker parked forever.

mod fingerprint;
pub mod prioritizer;
mod stats;

use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

pub use self::prioritizer::SequentialPrioritizer;
pub use self::stats::FileStat;
use crate::error::{Result, StreamError};
use crate::swarm::{
    FileEntry, InfoHash, PieceIndex, PieceLayout, SwarmError, SwarmHandle, SwarmMetadata,
    SwarmReader,
};

/// Live state for one content identifier.
pub struct Session {
    info_hash: InfoHash,
    handle: Arc<dyn SwarmHandle>,
    metadata: OnceCell<Arc<SwarmMetadata>>,
    prioritizer: SequentialPrioritizer,
    closed: CancellationToken,
    created_at: DateTime<Utc>,
}

/// Registry listing entry. Never waits on metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub info_hash: InfoHash,
    pub metadata_ready: bool,
    pub name: Option<String>,
    pub file_count: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Wraps a freshly added swarm handle.
    pub fn new(info_hash: InfoHash, handle: Arc<dyn SwarmHandle>, readahead_bytes: u64) -> Self {
        Self {
            info_hash,
            handle,
            metadata: OnceCell::new(),
            prioritizer: SequentialPrioritizer::new(readahead_bytes),
            closed: CancellationToken::new(),
            created_at: Utc::now(),
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Engine handle backing this session.
    pub fn handle(&self) -> &dyn SwarmHandle {
        self.handle.as_ref()
    }

    /// Metadata if it has already arrived.
    pub fn cached_metadata(&self) -> Option<&SwarmMetadata> {
        self.metadata.get().map(Arc::as_ref)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves when the session is torn down.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }

    pub fn summary(&self) -> SessionSummary {
        let metadata = self.cached_metadata();
        SessionSummary {
            info_hash: self.info_hash,
            metadata_ready: metadata.is_some(),
            name: metadata.map(|meta| meta.name.clone()),
            file_count: metadata.map(|meta| meta.files.len()),
            created_at: self.created_at,
        }
    }

    /// Suspends until the engine reports the file list.
    ///
    /// Concurrent callers share one underlying wait; each one can still walk
    /// away through its own `cancel`.
    ///
    /// # Errors
    ///
    /// - `StreamError::MetadataUnavailable` - Caller cancelled, or the engine has no metadata
    /// - `StreamError::SessionDropped` - Session was torn down while waiting
    /// - `StreamError::EngineFailure` - Engine failed or reported a zero piece length
    pub async fn metadata(&self, cancel: &CancellationToken) -> Result<Arc<SwarmMetadata>> {
        if let Some(metadata) = self.metadata.get() {
            return Ok(Arc::clone(metadata));
        }

        let init = self.metadata.get_or_try_init(|| async {
            let metadata = self.handle.metadata().await.map_err(|err| match err {
                SwarmError::MetadataMissing => StreamError::MetadataUnavailable {
                    reason: err.to_string(),
                },
                SwarmError::Closed => StreamError::SessionDropped {
                    info_hash: self.info_hash,
                },
                other => StreamError::EngineFailure(other),
            })?;
            if metadata.piece_length == 0 {
                return Err(StreamError::EngineFailure(SwarmError::Storage {
                    reason: "engine reported zero piece length".to_string(),
                }));
            }
            tracing::debug!(
                info_hash = %self.info_hash,
                files = metadata.files.len(),
                "metadata ready"
            );
            Ok(Arc::new(metadata))
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StreamError::MetadataUnavailable {
                reason: "request cancelled while waiting for metadata".to_string(),
            }),
            _ = self.closed.cancelled() => Err(StreamError::SessionDropped {
                info_hash: self.info_hash,
            }),
            result = init => result.map(Arc::clone),
        }
    }

    /// Waits for metadata, then resolves `file_idx` against the file list.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidIndex` - Index negative, past the end, or no files
    /// - Any error from `metadata`
    pub async fn file(
        &self,
        file_idx: i64,
        cancel: &CancellationToken,
    ) -> Result<(Arc<SwarmMetadata>, FileEntry)> {
        let metadata = self.metadata(cancel).await?;
        let file = usize::try_from(file_idx)
            .ok()
            .and_then(|idx| metadata.files.get(idx))
            .cloned()
            .ok_or(StreamError::InvalidIndex {
                file_idx,
                file_count: metadata.files.len(),
            })?;
        Ok((metadata, file))
    }

    /// Re-centres the urgent window for `file` at `offset`.
    pub fn focus(
        &self,
        layout: &PieceLayout,
        file: &FileEntry,
        offset: u64,
        min_len: u64,
    ) -> Range<PieceIndex> {
        self.prioritizer
            .focus(self.handle.as_ref(), layout, file, offset, min_len)
    }

    /// Raises every piece of `file` to the eager-download level.
    pub fn download_all(&self, layout: &PieceLayout, file: &FileEntry) {
        self.prioritizer
            .download_all(self.handle.as_ref(), layout, file);
    }

    /// Suspends until every piece in `pieces` is complete.
    ///
    /// Completion is monotonic, so already-verified pieces are skipped on
    /// every wake-up.
    ///
    /// # Errors
    ///
    /// - `StreamError::StreamAborted` - Caller cancelled while waiting
    /// - `StreamError::SessionDropped` - Session was torn down while waiting
    /// - `StreamError::EngineFailure` - Engine stopped publishing completions
    pub async fn wait_for_pieces(
        &self,
        pieces: Range<PieceIndex>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut events = self.handle.completion_events();
        let mut next = pieces.start.as_u32();
        let end = pieces.end.as_u32();

        loop {
            events.borrow_and_update();
            while next < end && self.handle.is_piece_complete(PieceIndex::new(next)) {
                next += 1;
            }
            if next >= end {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StreamError::StreamAborted {
                        reason: format!("request cancelled while waiting for piece {next}"),
                    });
                }
                _ = self.closed.cancelled() => {
                    return Err(StreamError::SessionDropped { info_hash: self.info_hash });
                }
                changed = events.changed() => {
                    if changed.is_err() {
                        return Err(StreamError::EngineFailure(SwarmError::Closed));
                    }
                }
            }
        }
    }

    /// Opens an engine reader for `file`, failing fast after teardown.
    ///
    /// # Errors
    ///
    /// - `StreamError::SessionDropped` - Session already torn down
    /// - `StreamError::EngineFailure` - Engine could not open the file
    pub async fn open_reader(&self, file: &FileEntry) -> Result<Box<dyn SwarmReader>> {
        if self.is_closed() {
            return Err(StreamError::SessionDropped {
                info_hash: self.info_hash,
            });
        }
        Ok(self.handle.open_reader(file).await?)
    }

    /// Tears the session down and releases engine resources.
    pub async fn close(&self) {
        self.closed.cancel();
        self.handle.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::swarm::test_mocks::MockSwarmEngine;
    use crate::swarm::{PiecePriority, SwarmEngine};

    async fn session_with(engine: &MockSwarmEngine, info_hash: InfoHash) -> Session {
        let handle = engine.add(info_hash).await.unwrap();
        Session::new(info_hash, handle, 100)
    }

    #[tokio::test]
    async fn test_metadata_waits_until_released() {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([1; 20]);
        engine.register(info_hash, MockSwarmEngine::single_file(1_000, 100));
        let session = Arc::new(session_with(&engine, info_hash).await);

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.metadata(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert!(session.cached_metadata().is_none());

        engine.torrent(info_hash).unwrap().release_metadata();
        let metadata = waiter.await.unwrap().unwrap();
        assert_eq!(metadata.files.len(), 1);
        assert!(session.summary().metadata_ready);
    }

    #[tokio::test]
    async fn test_metadata_wait_is_cancellable() {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([2; 20]);
        let session = session_with(&engine, info_hash).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = session.metadata(&cancel).await;
        assert!(matches!(
            result,
            Err(StreamError::MetadataUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_index_bounds() {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([3; 20]);
        engine.register(info_hash, MockSwarmEngine::single_file(1_000, 100));
        engine.torrent(info_hash).unwrap().release_metadata();
        let session = session_with(&engine, info_hash).await;
        let cancel = CancellationToken::new();

        assert!(session.file(0, &cancel).await.is_ok());
        for bad in [-1, 1, 42] {
            let result = session.file(bad, &cancel).await;
            assert!(matches!(
                result,
                Err(StreamError::InvalidIndex { file_count: 1, .. })
            ));
        }
        let torrent = engine.torrent(info_hash).unwrap();
        assert!(torrent.priority_calls().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_pieces_wakes_on_completion() {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([4; 20]);
        engine.register(info_hash, MockSwarmEngine::single_file(1_000, 100));
        let torrent = engine.torrent(info_hash).unwrap();
        torrent.release_metadata();
        let session = Arc::new(session_with(&engine, info_hash).await);

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .wait_for_pieces(
                        PieceIndex::new(2)..PieceIndex::new(4),
                        &CancellationToken::new(),
                    )
                    .await
            })
        };

        torrent.complete_piece(PieceIndex::new(2));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        torrent.complete_piece(PieceIndex::new(3));
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([5; 20]);
        engine.register(info_hash, MockSwarmEngine::single_file(1_000, 100));
        engine.torrent(info_hash).unwrap().release_metadata();
        let session = Arc::new(session_with(&engine, info_hash).await);

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .wait_for_pieces(
                        PieceIndex::new(0)..PieceIndex::new(1),
                        &CancellationToken::new(),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.close().await;

        assert!(matches!(
            waiter.await.unwrap(),
            Err(StreamError::SessionDropped { .. })
        ));
        assert!(engine.torrent(info_hash).unwrap().is_closed());
        let file = MockSwarmEngine::single_file(1_000, 100).files[0].clone();
        assert!(session.open_reader(&file).await.is_err());
    }

    #[tokio::test]
    async fn test_download_all_raises_file_priority() {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([6; 20]);
        engine.register(info_hash, MockSwarmEngine::single_file(1_000, 100));
        let torrent = engine.torrent(info_hash).unwrap();
        torrent.release_metadata();
        let session = session_with(&engine, info_hash).await;

        let (metadata, file) = session.file(0, &CancellationToken::new()).await.unwrap();
        session.download_all(&metadata.layout(), &file);

        for piece in 0..10 {
            assert_eq!(
                torrent.priority(PieceIndex::new(piece)),
                PiecePriority::High
            );
        }
    }
}
