//! Shared fixtures for integration tests.

use std::sync::Arc;
use std::time::Duration;

use anyflix_core::swarm::InfoHash;
use anyflix_core::{
    AnyflixConfig, ByteRangeRequest, ChunkBody, ChunkWindow, SessionManager, StreamError,
};
use anyflix_sim::{
    CompletionMode, SimulatedContent, SimulatedSwarm, SimulatedSwarmConfig, SimulatedTorrent,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

/// Manager over a simulated swarm holding a single content.
pub struct Fixture {
    pub swarm: Arc<SimulatedSwarm>,
    pub manager: SessionManager,
    pub content: Arc<SimulatedContent>,
    pub info_hash: InfoHash,
}

impl Fixture {
    /// Hand-driven swarm: nothing downloads until the test says so.
    pub fn manual(files: &[(&str, u64)], piece_length: u64) -> Self {
        Self::with_swarm(SimulatedSwarmConfig::manual(), files, piece_length)
    }

    /// Self-driving swarm that downloads by priority at `download_speed`.
    pub fn throttled(files: &[(&str, u64)], piece_length: u64, download_speed: u64) -> Self {
        let config = SimulatedSwarmConfig {
            mode: CompletionMode::Throttled,
            download_speed,
            metadata_delay: Duration::from_millis(5),
            peer_count: 12,
            seed: 11,
        };
        Self::with_swarm(config, files, piece_length)
    }

    fn with_swarm(config: SimulatedSwarmConfig, files: &[(&str, u64)], piece_length: u64) -> Self {
        let swarm = Arc::new(SimulatedSwarm::new(config));
        let content = SimulatedContent::generated("fixture", files, piece_length, 99).unwrap();
        let info_hash = swarm.insert(content);
        let content = swarm.content(info_hash).unwrap();
        let manager = SessionManager::new(swarm.clone(), &AnyflixConfig::for_testing().streaming);
        Self {
            swarm,
            manager,
            content,
            info_hash,
        }
    }

    /// Creates the session if needed and returns its simulated torrent.
    pub async fn torrent(&self) -> Arc<SimulatedTorrent> {
        self.manager
            .registry()
            .get_or_create(self.info_hash)
            .await
            .unwrap();
        self.swarm.torrent(self.info_hash).unwrap()
    }

    /// Torrent with metadata released and every piece complete.
    pub async fn ready(&self) -> Arc<SimulatedTorrent> {
        let torrent = self.torrent().await;
        torrent.release_metadata();
        torrent.complete_all();
        torrent
    }

    /// Streams one chunk of `file_idx` from `start` and collects it.
    pub async fn read_chunk(
        &self,
        file_idx: i64,
        start: u64,
    ) -> Result<(ChunkWindow, Vec<u8>), StreamError> {
        let chunk = self
            .manager
            .stream(
                self.info_hash,
                file_idx,
                ByteRangeRequest::from_start(start),
                &CancellationToken::new(),
            )
            .await?;
        let payload = collect_body(chunk.body).await.unwrap();
        Ok((chunk.window, payload))
    }

    /// Reference bytes of `file_idx` in `[start, end]`.
    pub fn expected(&self, file_idx: usize, window: &ChunkWindow) -> Vec<u8> {
        let file = self.content.file_bytes(file_idx).unwrap();
        file[window.start as usize..=window.end as usize].to_vec()
    }
}

pub async fn collect_body(mut body: ChunkBody) -> std::io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    while let Some(bytes) = body.next().await {
        payload.extend_from_slice(&bytes?);
    }
    Ok(payload)
}
