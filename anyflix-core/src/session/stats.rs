//! Point-in-time completion and swarm health snapshot for one file.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::error::Result;
use crate::swarm::layout::iter_pieces;

/// Download progress of one file plus live swarm counters.
///
/// Rebuilt on every request. `bytes_complete` counts whole verified pieces
/// only, so a partially downloaded boundary piece contributes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub bytes_complete: u64,
    pub bytes_total: u64,
    pub total_peers: usize,
    pub pending_peers: usize,
    pub active_peers: usize,
    pub connected_seeders: usize,
    pub half_open_peers: usize,
    pub pieces_complete: usize,
}

impl Session {
    /// Snapshot for `file_idx`. Waits on metadata only, never on downloads.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidIndex` - File index out of bounds
    /// - `StreamError::MetadataUnavailable` - Cancelled before metadata arrived
    pub async fn stat(&self, file_idx: i64, cancel: &CancellationToken) -> Result<FileStat> {
        let (metadata, file) = self.file(file_idx, cancel).await?;
        let layout = metadata.layout();
        let handle = self.handle();

        let bytes_complete = iter_pieces(layout.file_pieces(&file))
            .filter(|piece| handle.is_piece_complete(*piece))
            .map(|piece| layout.overlap(piece, &file))
            .sum();
        let swarm = handle.stats();

        Ok(FileStat {
            bytes_complete,
            bytes_total: file.length,
            total_peers: swarm.total_peers,
            pending_peers: swarm.pending_peers,
            active_peers: swarm.active_peers,
            connected_seeders: swarm.connected_seeders,
            half_open_peers: swarm.half_open_peers,
            pieces_complete: swarm.pieces_complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::swarm::test_mocks::MockSwarmEngine;
    use crate::swarm::{InfoHash, PieceIndex, SwarmEngine, SwarmStats};

    async fn ready_session(
        engine: &MockSwarmEngine,
        lengths: &[u64],
        piece_length: u64,
    ) -> (Session, Arc<crate::swarm::test_mocks::MockTorrent>) {
        let info_hash = InfoHash::new([0x5a; 20]);
        engine.register(info_hash, MockSwarmEngine::multi_file(lengths, piece_length));
        let torrent = engine.torrent(info_hash).unwrap();
        torrent.release_metadata();
        let handle = engine.add(info_hash).await.unwrap();
        (Session::new(info_hash, handle, 100), torrent)
    }

    #[tokio::test]
    async fn test_stat_counts_whole_pieces_only() {
        let engine = MockSwarmEngine::new();
        let (session, torrent) = ready_session(&engine, &[250, 250], 100).await;
        let cancel = CancellationToken::new();

        let empty = session.stat(1, &cancel).await.unwrap();
        assert_eq!(empty.bytes_complete, 0);
        assert_eq!(empty.bytes_total, 250);

        // Piece 2 straddles both files: 50 bytes each.
        torrent.complete_piece(PieceIndex::new(2));
        assert_eq!(session.stat(0, &cancel).await.unwrap().bytes_complete, 50);
        assert_eq!(session.stat(1, &cancel).await.unwrap().bytes_complete, 50);

        torrent.complete_all();
        let full = session.stat(1, &cancel).await.unwrap();
        assert_eq!(full.bytes_complete, 250);
        assert_eq!(full.pieces_complete, 5);
    }

    #[tokio::test]
    async fn test_stat_copies_swarm_counters() {
        let engine = MockSwarmEngine::new();
        let (session, torrent) = ready_session(&engine, &[1_000], 100).await;
        torrent.set_stats(SwarmStats {
            total_peers: 12,
            pending_peers: 3,
            active_peers: 7,
            connected_seeders: 4,
            half_open_peers: 2,
            pieces_complete: 0,
        });

        let stat = session.stat(0, &CancellationToken::new()).await.unwrap();
        assert_eq!(stat.total_peers, 12);
        assert_eq!(stat.pending_peers, 3);
        assert_eq!(stat.active_peers, 7);
        assert_eq!(stat.connected_seeders, 4);
        assert_eq!(stat.half_open_peers, 2);
    }

    #[tokio::test]
    async fn test_stat_serializes_camel_case() {
        let engine = MockSwarmEngine::new();
        let (session, _torrent) = ready_session(&engine, &[1_000], 100).await;
        let stat = session.stat(0, &CancellationToken::new()).await.unwrap();

        let json = serde_json::to_value(stat).unwrap();
        assert_eq!(json["bytesTotal"], 1_000);
        assert!(json.get("connectedSeeders").is_some());
        assert!(json.get("halfOpenPeers").is_some());
    }
}
