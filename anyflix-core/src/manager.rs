//! Request-level entry point tying registry, sessions and streaming together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::StreamingConfig;
use crate::error::Result;
use crate::registry::{SessionRegistryHandle, spawn_session_registry};
use crate::session::{FileStat, SessionSummary};
use crate::streaming::{ByteRangeRequest, ChunkStream, RangeStreamer};
use crate::swarm::{InfoHash, SwarmEngine};

/// Operations exposed to the routing layer.
///
/// Every method takes the request's cancellation token; dropping the request
/// cancels any metadata or piece wait it is parked on.
#[derive(Clone)]
pub struct SessionManager {
    registry: SessionRegistryHandle,
    streamer: RangeStreamer,
}

impl SessionManager {
    /// Spawns the registry actor over `engine`.
    pub fn new(engine: Arc<dyn SwarmEngine>, config: &StreamingConfig) -> Self {
        Self {
            registry: spawn_session_registry(engine, config.readahead_bytes),
            streamer: RangeStreamer::new(config.chunk_size, config.read_buffer_size),
        }
    }

    pub fn registry(&self) -> &SessionRegistryHandle {
        &self.registry
    }

    /// Serves one chunk of `file_idx` starting at the requested offset.
    pub async fn stream(
        &self,
        info_hash: InfoHash,
        file_idx: i64,
        request: ByteRangeRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        let session = self.registry.get_or_create(info_hash).await?;
        self.streamer
            .open_chunk(&session, file_idx, request, cancel)
            .await
    }

    /// Completion and swarm health snapshot for one file.
    pub async fn stat(
        &self,
        info_hash: InfoHash,
        file_idx: i64,
        cancel: &CancellationToken,
    ) -> Result<FileStat> {
        let session = self.registry.get_or_create(info_hash).await?;
        session.stat(file_idx, cancel).await
    }

    /// Subtitle-matching fingerprint for one file.
    pub async fn fingerprint(
        &self,
        info_hash: InfoHash,
        file_idx: i64,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let session = self.registry.get_or_create(info_hash).await?;
        session.fingerprint(file_idx, cancel).await
    }

    /// Queues the whole file for eager download and returns immediately.
    ///
    /// Waits for metadata so the index can be validated. Progress is
    /// observable through `stat`.
    ///
    /// # Errors
    /// - `StreamError::InvalidIndex` - File index out of bounds
    /// - `StreamError::MetadataUnavailable` - Cancelled before metadata arrived
    pub async fn download_file(
        &self,
        info_hash: InfoHash,
        file_idx: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session = self.registry.get_or_create(info_hash).await?;
        let (metadata, file) = session.file(file_idx, cancel).await?;
        session.download_all(&metadata.layout(), &file);
        tracing::info!(%info_hash, file_idx, bytes = file.length, "eager download queued");
        Ok(())
    }

    /// Tears down the session. Unknown identifiers succeed.
    pub async fn drop_session(&self, info_hash: InfoHash) -> Result<()> {
        self.registry.drop_session(info_hash).await?;
        Ok(())
    }

    /// Summaries of all live sessions.
    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        self.registry.list().await
    }

    /// Closes every session and stops the registry.
    pub async fn shutdown(&self) -> Result<()> {
        self.registry.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnyflixConfig;
    use crate::error::StreamError;
    use crate::swarm::test_mocks::MockSwarmEngine;
    use crate::swarm::{PieceIndex, PiecePriority};

    fn manager_with(engine: &Arc<MockSwarmEngine>) -> SessionManager {
        let config = AnyflixConfig::for_testing();
        SessionManager::new(engine.clone(), &config.streaming)
    }

    #[tokio::test]
    async fn test_download_file_is_fire_and_forget() {
        let engine = Arc::new(MockSwarmEngine::new());
        let info_hash = InfoHash::new([0x21; 20]);
        engine.register(info_hash, MockSwarmEngine::multi_file(&[300, 300], 100));
        engine.torrent(info_hash).unwrap().release_metadata();
        let manager = manager_with(&engine);
        let cancel = CancellationToken::new();

        manager.download_file(info_hash, 1, &cancel).await.unwrap();

        let torrent = engine.torrent(info_hash).unwrap();
        for piece in 3..6 {
            assert_eq!(torrent.priority(PieceIndex::new(piece)), PiecePriority::High);
        }
        assert_eq!(torrent.priority(PieceIndex::new(0)), PiecePriority::Normal);
        assert_eq!(manager.stat(info_hash, 1, &cancel).await.unwrap().bytes_complete, 0);
    }

    #[tokio::test]
    async fn test_bad_index_touches_no_priorities() {
        let engine = Arc::new(MockSwarmEngine::new());
        let info_hash = InfoHash::new([0x22; 20]);
        engine.register(info_hash, MockSwarmEngine::single_file(1_000, 100));
        engine.torrent(info_hash).unwrap().release_metadata();
        let manager = manager_with(&engine);
        let cancel = CancellationToken::new();

        for bad in [-1, 1] {
            assert!(matches!(
                manager.download_file(info_hash, bad, &cancel).await,
                Err(StreamError::InvalidIndex { .. })
            ));
            assert!(matches!(
                manager
                    .stream(info_hash, bad, ByteRangeRequest::default(), &cancel)
                    .await,
                Err(StreamError::InvalidIndex { .. })
            ));
        }
        assert!(engine.torrent(info_hash).unwrap().priority_calls().is_empty());
    }

    #[tokio::test]
    async fn test_drop_is_idempotent() {
        let engine = Arc::new(MockSwarmEngine::new());
        let manager = manager_with(&engine);
        let info_hash = InfoHash::new([0x23; 20]);

        manager.drop_session(info_hash).await.unwrap();
        manager.stat(info_hash, 0, &cancelled()).await.unwrap_err();
        manager.drop_session(info_hash).await.unwrap();
        manager.drop_session(info_hash).await.unwrap();

        assert!(manager.sessions().await.unwrap().is_empty());
        assert_eq!(engine.torrent(info_hash).unwrap().close_count(), 1);
    }

    fn cancelled() -> CancellationToken {
        let token = CancellationToken::new();
        token.cancel();
        token
    }
}
