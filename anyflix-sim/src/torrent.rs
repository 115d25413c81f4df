//! Simulated swarm handle and its download driver.

use std::io;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyflix_core::swarm::layout::iter_pieces;
use anyflix_core::swarm::{
    FileEntry, InfoHash, PieceIndex, PiecePriority, SwarmError, SwarmHandle, SwarmMetadata,
    SwarmReader, SwarmStats,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::seq::IndexedRandom;
use rand_chacha::ChaCha8Rng;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

use crate::content::SimulatedContent;
use crate::swarm::{CompletionMode, SimulatedSwarmConfig};

struct TorrentState {
    metadata_ready: bool,
    completed: Vec<bool>,
    priorities: Vec<PiecePriority>,
}

struct Shared {
    info_hash: InfoHash,
    content: Option<Arc<SimulatedContent>>,
    state: Mutex<TorrentState>,
    metadata_signal: watch::Sender<bool>,
    completions: watch::Sender<u64>,
    priority_changed: Notify,
    closed: CancellationToken,
    peer_count: usize,
}

impl Shared {
    fn is_complete(&self, piece: u32) -> bool {
        self.state
            .lock()
            .completed
            .get(piece as usize)
            .copied()
            .unwrap_or(false)
    }

    fn release_metadata(&self) {
        if self.content.is_none() || self.closed.is_cancelled() {
            return;
        }
        self.state.lock().metadata_ready = true;
        self.metadata_signal.send_replace(true);
        tracing::debug!(info_hash = %self.info_hash, "simulated metadata released");
    }

    fn mark_complete(&self, pieces: Range<u32>) {
        {
            let mut state = self.state.lock();
            for piece in pieces {
                if let Some(done) = state.completed.get_mut(piece as usize) {
                    *done = true;
                }
            }
        }
        self.completions.send_modify(|generation| *generation += 1);
    }

    /// Highest-priority incomplete piece, ties broken by `rng`.
    fn next_piece(&self, rng: &mut ChaCha8Rng) -> Option<u32> {
        let state = self.state.lock();
        let top = state
            .priorities
            .iter()
            .zip(&state.completed)
            .filter(|(priority, done)| !**done && **priority != PiecePriority::None)
            .map(|(priority, _)| *priority)
            .max()?;

        let candidates: Vec<u32> = state
            .priorities
            .iter()
            .zip(&state.completed)
            .enumerate()
            .filter(|(_, (priority, done))| !**done && **priority == top)
            .map(|(index, _)| index as u32)
            .collect();
        candidates.choose(rng).copied()
    }
}

/// One joined simulated swarm.
///
/// In `Manual` mode nothing happens until a test calls `release_metadata`
/// or `complete_piece`. In `Throttled` mode a background task releases
/// metadata after the configured delay and then downloads pieces one at a
/// time, always picking the most urgent one.
pub struct SimulatedTorrent {
    shared: Arc<Shared>,
}

impl SimulatedTorrent {
    pub(crate) fn start(
        info_hash: InfoHash,
        content: Option<Arc<SimulatedContent>>,
        config: &SimulatedSwarmConfig,
    ) -> Self {
        let piece_count = content
            .as_ref()
            .map(|content| content.layout().piece_count() as usize)
            .unwrap_or(0);
        let shared = Arc::new(Shared {
            info_hash,
            content,
            state: Mutex::new(TorrentState {
                metadata_ready: false,
                completed: vec![false; piece_count],
                priorities: vec![PiecePriority::Normal; piece_count],
            }),
            metadata_signal: watch::channel(false).0,
            completions: watch::channel(0).0,
            priority_changed: Notify::new(),
            closed: CancellationToken::new(),
            peer_count: config.peer_count,
        });

        if config.mode == CompletionMode::Throttled {
            let seed = config.seed ^ u64::from_be_bytes(prefix(info_hash));
            tokio::spawn(run_driver(
                Arc::clone(&shared),
                config.download_speed,
                config.metadata_delay,
                seed,
            ));
        }

        Self { shared }
    }

    /// Lets pending `metadata()` calls resolve. No-op for unknown content.
    pub fn release_metadata(&self) {
        self.shared.release_metadata();
    }

    pub fn complete_piece(&self, piece: PieceIndex) {
        self.shared.mark_complete(piece.as_u32()..piece.as_u32() + 1);
    }

    pub fn complete_all(&self) {
        let count = self.shared.state.lock().completed.len() as u32;
        self.shared.mark_complete(0..count);
    }

    /// Priority the core last set for `piece`.
    pub fn priority(&self, piece: PieceIndex) -> Option<PiecePriority> {
        self.shared
            .state
            .lock()
            .priorities
            .get(piece.as_u32() as usize)
            .copied()
    }

    /// Number of verified pieces.
    pub fn completed_pieces(&self) -> usize {
        self.shared.state.lock().completed.iter().filter(|done| **done).count()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Callers currently parked in `metadata()`.
    pub fn metadata_waiters(&self) -> usize {
        self.shared.metadata_signal.receiver_count()
    }
}

fn prefix(info_hash: InfoHash) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&info_hash.as_bytes()[..8]);
    bytes
}

async fn run_driver(shared: Arc<Shared>, download_speed: u64, metadata_delay: Duration, seed: u64) {
    let Some(content) = shared.content.clone() else {
        // Dead swarm: metadata never arrives.
        return;
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    tokio::select! {
        _ = shared.closed.cancelled() => return,
        _ = tokio::time::sleep(metadata_delay) => shared.release_metadata(),
    }

    let layout = content.layout();
    let speed = download_speed.max(1) as f64;

    loop {
        let notified = shared.priority_changed.notified();
        let Some(piece) = shared.next_piece(&mut rng) else {
            tokio::select! {
                _ = shared.closed.cancelled() => break,
                _ = notified => {}
            }
            continue;
        };

        let span = layout.piece_span(PieceIndex::new(piece));
        let delay = Duration::from_secs_f64((span.end - span.start) as f64 / speed);
        tokio::select! {
            _ = shared.closed.cancelled() => break,
            _ = tokio::time::sleep(delay) => shared.mark_complete(piece..piece + 1),
        }
        tracing::trace!(info_hash = %shared.info_hash, piece, "simulated piece downloaded");
    }

    tracing::debug!(info_hash = %shared.info_hash, "simulated driver stopped");
}

#[async_trait]
impl SwarmHandle for SimulatedTorrent {
    async fn metadata(&self) -> Result<SwarmMetadata, SwarmError> {
        let mut signal = self.shared.metadata_signal.subscribe();
        tokio::select! {
            _ = self.shared.closed.cancelled() => Err(SwarmError::Closed),
            ready = signal.wait_for(|ready| *ready) => match (ready, &self.shared.content) {
                (Ok(_), Some(content)) => Ok(content.metadata()),
                (Ok(_), None) => Err(SwarmError::MetadataMissing),
                (Err(_), _) => Err(SwarmError::Closed),
            },
        }
    }

    fn set_priority(&self, pieces: Range<PieceIndex>, priority: PiecePriority) {
        {
            let mut state = self.shared.state.lock();
            for piece in iter_pieces(pieces) {
                if let Some(slot) = state.priorities.get_mut(piece.as_u32() as usize) {
                    *slot = priority;
                }
            }
        }
        self.shared.priority_changed.notify_one();
    }

    fn is_piece_complete(&self, piece: PieceIndex) -> bool {
        self.shared.is_complete(piece.as_u32())
    }

    fn piece_hash(&self, piece: PieceIndex) -> Option<[u8; 20]> {
        self.shared.content.as_ref()?.piece_hash(piece)
    }

    fn completion_events(&self) -> watch::Receiver<u64> {
        self.shared.completions.subscribe()
    }

    fn stats(&self) -> SwarmStats {
        if self.shared.closed.is_cancelled() {
            return SwarmStats::default();
        }
        let peers = self.shared.peer_count;
        let state = self.shared.state.lock();
        let pieces_complete = state.completed.iter().filter(|done| **done).count();
        if !state.metadata_ready {
            return SwarmStats {
                total_peers: peers,
                pending_peers: peers,
                pieces_complete,
                ..SwarmStats::default()
            };
        }

        let active_peers = peers / 2;
        let half_open_peers = peers / 6;
        SwarmStats {
            total_peers: peers,
            pending_peers: peers - active_peers - half_open_peers,
            active_peers,
            connected_seeders: peers / 3,
            half_open_peers,
            pieces_complete,
        }
    }

    async fn open_reader(&self, file: &FileEntry) -> Result<Box<dyn SwarmReader>, SwarmError> {
        if self.shared.closed.is_cancelled() {
            return Err(SwarmError::Closed);
        }
        let content = self
            .shared
            .content
            .as_ref()
            .ok_or(SwarmError::MetadataMissing)?;
        if file.offset + file.length > content.total_length() {
            return Err(SwarmError::Storage {
                reason: format!("file {} lies outside stored payload", file.index),
            });
        }

        Ok(Box::new(SimulatedReader {
            shared: Arc::clone(&self.shared),
            payload_offset: file.offset,
            length: file.length,
            piece_length: content.piece_length(),
            position: 0,
        }))
    }

    async fn close(&self) {
        if self.shared.closed.is_cancelled() {
            return;
        }
        self.shared.closed.cancel();
        self.shared.metadata_signal.send_replace(false);
        tracing::debug!(info_hash = %self.shared.info_hash, "simulated swarm closed");
    }
}

/// Reader over one file that only yields bytes of verified pieces.
struct SimulatedReader {
    shared: Arc<Shared>,
    payload_offset: u64,
    length: u64,
    piece_length: u64,
    position: u64,
}

impl AsyncRead for SimulatedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.shared.closed.is_cancelled() {
            return Poll::Ready(Err(io::Error::other(SwarmError::Closed)));
        }
        if this.position >= this.length || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let Some(content) = this.shared.content.as_ref() else {
            return Poll::Ready(Err(io::Error::other(SwarmError::MetadataMissing)));
        };

        let absolute = this.payload_offset + this.position;
        let piece = (absolute / this.piece_length) as u32;
        if !this.shared.is_complete(piece) {
            return Poll::Ready(Err(io::Error::other(SwarmError::PieceUnavailable {
                index: PieceIndex::new(piece),
            })));
        }

        let piece_end = (u64::from(piece) + 1) * this.piece_length;
        let file_end = this.payload_offset + this.length;
        let available = piece_end.min(file_end) - absolute;
        let take = available.min(buf.remaining() as u64) as usize;
        let start = absolute as usize;
        buf.put_slice(&content.payload()[start..start + take]);
        this.position += take as u64;

        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for SimulatedReader {
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let target = match position {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::End(delta) => this.length.checked_add_signed(delta),
            io::SeekFrom::Current(delta) => this.position.checked_add_signed(delta),
        };
        this.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}
