//! Mock swarm engine for unit tests.
//!
//! Nothing happens on its own: tests release metadata and complete pieces
//! explicitly, and every priority call is recorded for inspection.

use std::collections::HashMap;
use std::io::Cursor;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::layout::iter_pieces;
use super::{
    FileEntry, InfoHash, PieceIndex, PiecePriority, SwarmEngine, SwarmError, SwarmHandle,
    SwarmMetadata, SwarmReader, SwarmStats,
};

/// Byte stored at torrent-absolute `offset` in every mock payload.
pub fn mock_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// Engine whose swarms only progress when a test says so.
#[derive(Default)]
pub struct MockSwarmEngine {
    torrents: Mutex<HashMap<InfoHash, Arc<MockTorrent>>>,
    catalog: Mutex<HashMap<InfoHash, SwarmMetadata>>,
    add_calls: Mutex<HashMap<InfoHash, usize>>,
}

impl MockSwarmEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for a torrent holding one file named `movie.mp4`.
    pub fn single_file(length: u64, piece_length: u64) -> SwarmMetadata {
        Self::multi_file(&[length], piece_length)
    }

    /// Metadata for consecutive files `file0.mkv`, `file1.mkv`, ...
    pub fn multi_file(lengths: &[u64], piece_length: u64) -> SwarmMetadata {
        let mut offset = 0;
        let files = lengths
            .iter()
            .enumerate()
            .map(|(index, &length)| {
                let path = if lengths.len() == 1 {
                    PathBuf::from("movie.mp4")
                } else {
                    PathBuf::from(format!("file{index}.mkv"))
                };
                let entry = FileEntry {
                    index,
                    offset,
                    length,
                    path,
                };
                offset += length;
                entry
            })
            .collect();
        SwarmMetadata {
            name: "mock".to_string(),
            piece_length,
            files,
        }
    }

    /// Registers content and creates its (not yet added) torrent.
    pub fn register(&self, info_hash: InfoHash, metadata: SwarmMetadata) {
        self.catalog.lock().insert(info_hash, metadata.clone());
        self.torrents
            .lock()
            .insert(info_hash, Arc::new(MockTorrent::new(Some(metadata))));
    }

    /// Current torrent for `info_hash`, if one exists.
    pub fn torrent(&self, info_hash: InfoHash) -> Option<Arc<MockTorrent>> {
        self.torrents.lock().get(&info_hash).cloned()
    }

    /// Number of `add` calls seen for `info_hash`.
    pub fn add_count(&self, info_hash: InfoHash) -> usize {
        self.add_calls.lock().get(&info_hash).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SwarmEngine for MockSwarmEngine {
    async fn add(&self, info_hash: InfoHash) -> Result<Arc<dyn SwarmHandle>, SwarmError> {
        *self.add_calls.lock().entry(info_hash).or_default() += 1;
        // Yield so concurrent callers genuinely interleave.
        tokio::task::yield_now().await;

        let mut torrents = self.torrents.lock();
        let reusable = torrents
            .get(&info_hash)
            .filter(|torrent| !torrent.is_closed())
            .cloned();
        let torrent = match reusable {
            Some(torrent) => torrent,
            None => {
                let metadata = self.catalog.lock().get(&info_hash).cloned();
                let fresh = Arc::new(MockTorrent::new(metadata));
                torrents.insert(info_hash, Arc::clone(&fresh));
                fresh
            }
        };
        Ok(torrent)
    }
}

struct MockState {
    released: bool,
    completed: Vec<bool>,
    priorities: Vec<PiecePriority>,
    priority_calls: Vec<(Range<PieceIndex>, PiecePriority)>,
    closed: bool,
}

/// Hand-driven swarm handle.
pub struct MockTorrent {
    metadata: Option<SwarmMetadata>,
    state: Mutex<MockState>,
    metadata_signal: watch::Sender<bool>,
    completions: watch::Sender<u64>,
    close_calls: AtomicUsize,
    stats: Mutex<SwarmStats>,
}

impl MockTorrent {
    fn new(metadata: Option<SwarmMetadata>) -> Self {
        let piece_count = metadata
            .as_ref()
            .map(|meta| meta.layout().piece_count() as usize)
            .unwrap_or(0);
        Self {
            metadata,
            state: Mutex::new(MockState {
                released: false,
                completed: vec![false; piece_count],
                priorities: vec![PiecePriority::Normal; piece_count],
                priority_calls: Vec::new(),
                closed: false,
            }),
            metadata_signal: watch::channel(false).0,
            completions: watch::channel(0).0,
            close_calls: AtomicUsize::new(0),
            stats: Mutex::new(SwarmStats::default()),
        }
    }

    /// Lets pending `metadata()` calls resolve.
    pub fn release_metadata(&self) {
        self.state.lock().released = true;
        self.metadata_signal.send_replace(true);
    }

    pub fn complete_piece(&self, piece: PieceIndex) {
        if let Some(done) = self.state.lock().completed.get_mut(piece.as_u32() as usize) {
            *done = true;
        }
        self.completions.send_modify(|generation| *generation += 1);
    }

    pub fn complete_all(&self) {
        self.state.lock().completed.fill(true);
        self.completions.send_modify(|generation| *generation += 1);
    }

    pub fn set_stats(&self, stats: SwarmStats) {
        *self.stats.lock() = stats;
    }

    pub fn priority(&self, piece: PieceIndex) -> PiecePriority {
        self.state.lock().priorities[piece.as_u32() as usize]
    }

    pub fn priority_calls(&self) -> Vec<(Range<PieceIndex>, PiecePriority)> {
        self.state.lock().priority_calls.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SwarmHandle for MockTorrent {
    async fn metadata(&self) -> Result<SwarmMetadata, SwarmError> {
        let mut signal = self.metadata_signal.subscribe();
        loop {
            {
                let state = self.state.lock();
                if state.closed {
                    return Err(SwarmError::Closed);
                }
                if state.released {
                    return self.metadata.clone().ok_or(SwarmError::MetadataMissing);
                }
            }
            if signal.changed().await.is_err() {
                return Err(SwarmError::Closed);
            }
        }
    }

    fn set_priority(&self, pieces: Range<PieceIndex>, priority: PiecePriority) {
        let mut state = self.state.lock();
        state.priority_calls.push((pieces.clone(), priority));
        for piece in iter_pieces(pieces) {
            if let Some(slot) = state.priorities.get_mut(piece.as_u32() as usize) {
                *slot = priority;
            }
        }
    }

    fn is_piece_complete(&self, piece: PieceIndex) -> bool {
        self.state
            .lock()
            .completed
            .get(piece.as_u32() as usize)
            .copied()
            .unwrap_or(false)
    }

    fn piece_hash(&self, piece: PieceIndex) -> Option<[u8; 20]> {
        let count = self.state.lock().completed.len() as u32;
        (piece.as_u32() < count).then(|| [piece.as_u32() as u8; 20])
    }

    fn completion_events(&self) -> watch::Receiver<u64> {
        self.completions.subscribe()
    }

    fn stats(&self) -> SwarmStats {
        let mut stats = *self.stats.lock();
        stats.pieces_complete = self.state.lock().completed.iter().filter(|d| **d).count();
        stats
    }

    async fn open_reader(&self, file: &FileEntry) -> Result<Box<dyn SwarmReader>, SwarmError> {
        if self.is_closed() {
            return Err(SwarmError::Closed);
        }
        let bytes: Vec<u8> = file.span().map(mock_byte).collect();
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.state.lock().closed = true;
        self.metadata_signal.send_replace(false);
    }
}
