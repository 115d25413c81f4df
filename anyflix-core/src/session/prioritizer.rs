//! Sequential readahead prioritization.
//!
//! Swarm engines default to rarest-first ordering, which is good for the
//! swarm and bad for playback. On every read the prioritizer marks the
//! pieces covering `[offset, offset + readahead)` as `Now` and drops the
//! previous window of that file back to normal. Offsets may jump in either
//! direction; the window is simply recomputed.
//!
//! Files share boundary pieces, so a piece always carries the strongest level
//! any file asks for: `Now` inside some file's window, `High` inside an eager
//! file, `Normal` otherwise.

use std::collections::HashMap;
use std::ops::Range;

use parking_lot::Mutex;

use crate::swarm::layout::iter_pieces;
use crate::swarm::{FileEntry, PieceIndex, PieceLayout, PiecePriority, SwarmHandle};

#[derive(Default)]
struct WindowState {
    /// Current urgent window per file index
    windows: HashMap<usize, Range<PieceIndex>>,
    /// Pieces of files with an eager whole-file download requested
    eager: HashMap<usize, Range<PieceIndex>>,
}

impl WindowState {
    /// Strongest level any file asks for on `piece`.
    fn effective(&self, piece: PieceIndex) -> PiecePriority {
        if self.windows.values().any(|window| window.contains(&piece)) {
            PiecePriority::Now
        } else if self.eager.values().any(|pieces| pieces.contains(&piece)) {
            PiecePriority::High
        } else {
            PiecePriority::Normal
        }
    }

    /// Pushes the effective level of every piece in `pieces`, one engine
    /// call per run of equal levels.
    fn apply(&self, handle: &dyn SwarmHandle, pieces: Range<PieceIndex>) {
        let end = pieces.end;
        let mut run: Option<(PieceIndex, PiecePriority)> = None;
        for piece in iter_pieces(pieces) {
            let level = self.effective(piece);
            match run {
                Some((_, current)) if current == level => {}
                Some((start, current)) => {
                    handle.set_priority(start..piece, current);
                    run = Some((piece, level));
                }
                None => run = Some((piece, level)),
            }
        }
        if let Some((start, level)) = run {
            handle.set_priority(start..end, level);
        }
    }
}

/// Moves a per-file urgent window as the client reads.
pub struct SequentialPrioritizer {
    readahead_bytes: u64,
    state: Mutex<WindowState>,
}

impl SequentialPrioritizer {
    pub fn new(readahead_bytes: u64) -> Self {
        Self {
            readahead_bytes,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Pieces covering the readahead window at file-relative `offset`.
    ///
    /// The window is at least `min_len` bytes so it always contains what the
    /// caller is about to wait on.
    pub fn window(
        &self,
        layout: &PieceLayout,
        file: &FileEntry,
        offset: u64,
        min_len: u64,
    ) -> Range<PieceIndex> {
        let offset = offset.min(file.length);
        let len = self
            .readahead_bytes
            .max(min_len)
            .min(file.length - offset);
        layout.pieces_for(file.offset + offset, len)
    }

    /// Re-centres the urgent window of `file` at `offset`.
    ///
    /// Pieces leaving the window fall back to the strongest level any other
    /// file still holds on them. Engine calls happen under the state lock so
    /// the most recent window always wins when reads race.
    pub fn focus(
        &self,
        handle: &dyn SwarmHandle,
        layout: &PieceLayout,
        file: &FileEntry,
        offset: u64,
        min_len: u64,
    ) -> Range<PieceIndex> {
        let window = self.window(layout, file, offset, min_len);
        let mut state = self.state.lock();

        if let Some(previous) = state.windows.insert(file.index, window.clone()) {
            if previous == window {
                return window;
            }
            for stale in subtract(&previous, &window) {
                state.apply(handle, stale);
            }
        }

        if window.start < window.end {
            handle.set_priority(window.clone(), PiecePriority::Now);
        }
        tracing::trace!(
            file_idx = file.index,
            offset,
            first = %window.start,
            end = %window.end,
            "readahead window moved"
        );
        window
    }

    /// Raises all pieces of `file` to `High`. Pieces inside any urgent
    /// window stay `Now`.
    pub fn download_all(&self, handle: &dyn SwarmHandle, layout: &PieceLayout, file: &FileEntry) {
        let pieces = layout.file_pieces(file);
        let mut state = self.state.lock();
        state.eager.insert(file.index, pieces.clone());
        state.apply(handle, pieces);
    }

    /// Current urgent window of a file, if it has been read.
    pub fn current_window(&self, file_idx: usize) -> Option<Range<PieceIndex>> {
        self.state.lock().windows.get(&file_idx).cloned()
    }
}

/// `a` minus `b`: at most two disjoint ranges.
fn subtract(a: &Range<PieceIndex>, b: &Range<PieceIndex>) -> Vec<Range<PieceIndex>> {
    if a.start >= a.end {
        return Vec::new();
    }
    if b.start >= b.end || b.end <= a.start || b.start >= a.end {
        return vec![a.clone()];
    }
    let mut parts = Vec::with_capacity(2);
    if a.start < b.start {
        parts.push(a.start..b.start);
    }
    if b.end < a.end {
        parts.push(b.end..a.end);
    }
    parts
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::swarm::test_mocks::MockSwarmEngine;
    use crate::swarm::{InfoHash, SwarmEngine};

    fn pieces(start: u32, end: u32) -> Range<PieceIndex> {
        PieceIndex::new(start)..PieceIndex::new(end)
    }

    fn file(index: usize, offset: u64, length: u64) -> FileEntry {
        FileEntry {
            index,
            offset,
            length,
            path: PathBuf::from("f"),
        }
    }

    async fn mock_torrent(
        metadata: crate::swarm::SwarmMetadata,
    ) -> std::sync::Arc<crate::swarm::test_mocks::MockTorrent> {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([9; 20]);
        engine.register(info_hash, metadata);
        engine.add(info_hash).await.unwrap();
        engine.torrent(info_hash).unwrap()
    }

    #[test]
    fn test_subtract() {
        assert_eq!(
            subtract(&pieces(0, 10), &pieces(3, 5)),
            vec![pieces(0, 3), pieces(5, 10)]
        );
        assert!(subtract(&pieces(0, 10), &pieces(0, 10)).is_empty());
        assert_eq!(subtract(&pieces(0, 4), &pieces(6, 8)), vec![pieces(0, 4)]);
        assert_eq!(subtract(&pieces(4, 8), &pieces(0, 6)), vec![pieces(6, 8)]);
    }

    #[test]
    fn test_window_respects_file_offset_and_end() {
        let prioritizer = SequentialPrioritizer::new(250);
        let layout = PieceLayout::new(100, 2_000);
        let second = file(1, 1_000, 1_000);

        assert_eq!(prioritizer.window(&layout, &second, 0, 0), pieces(10, 13));
        assert_eq!(prioritizer.window(&layout, &second, 950, 0), pieces(19, 20));
        assert_eq!(prioritizer.window(&layout, &second, 0, 600), pieces(10, 16));
    }

    #[tokio::test]
    async fn test_focus_marks_window_now() {
        let torrent = mock_torrent(MockSwarmEngine::single_file(2_000, 100)).await;
        let prioritizer = SequentialPrioritizer::new(300);
        let layout = PieceLayout::new(100, 2_000);
        let target = file(0, 0, 2_000);

        let window = prioritizer.focus(torrent.as_ref(), &layout, &target, 550, 0);
        assert_eq!(window, pieces(5, 9));
        for piece in 5..9 {
            assert_eq!(torrent.priority(PieceIndex::new(piece)), PiecePriority::Now);
        }
        assert_eq!(torrent.priority(PieceIndex::new(9)), PiecePriority::Normal);
    }

    #[tokio::test]
    async fn test_backward_seek_reverts_old_window() {
        let torrent = mock_torrent(MockSwarmEngine::single_file(2_000, 100)).await;
        let prioritizer = SequentialPrioritizer::new(200);
        let layout = PieceLayout::new(100, 2_000);
        let target = file(0, 0, 2_000);

        prioritizer.focus(torrent.as_ref(), &layout, &target, 1_500, 0);
        prioritizer.focus(torrent.as_ref(), &layout, &target, 10, 0);

        assert_eq!(torrent.priority(PieceIndex::new(0)), PiecePriority::Now);
        assert_eq!(torrent.priority(PieceIndex::new(2)), PiecePriority::Now);
        assert_eq!(torrent.priority(PieceIndex::new(15)), PiecePriority::Normal);
        assert_eq!(torrent.priority(PieceIndex::new(16)), PiecePriority::Normal);
        assert_eq!(prioritizer.current_window(0), Some(pieces(0, 3)));
    }

    #[tokio::test]
    async fn test_eager_download_baseline_survives_window_moves() {
        let torrent = mock_torrent(MockSwarmEngine::single_file(1_000, 100)).await;
        let prioritizer = SequentialPrioritizer::new(200);
        let layout = PieceLayout::new(100, 1_000);
        let target = file(0, 0, 1_000);

        prioritizer.focus(torrent.as_ref(), &layout, &target, 0, 0);
        prioritizer.download_all(torrent.as_ref(), &layout, &target);
        assert_eq!(torrent.priority(PieceIndex::new(0)), PiecePriority::Now);
        assert_eq!(torrent.priority(PieceIndex::new(5)), PiecePriority::High);

        prioritizer.focus(torrent.as_ref(), &layout, &target, 500, 0);
        assert_eq!(torrent.priority(PieceIndex::new(0)), PiecePriority::High);
        assert_eq!(torrent.priority(PieceIndex::new(5)), PiecePriority::Now);
    }

    #[tokio::test]
    async fn test_shared_piece_stays_urgent_for_other_file() {
        let torrent = mock_torrent(MockSwarmEngine::multi_file(&[250, 250], 100)).await;
        let prioritizer = SequentialPrioritizer::new(100);
        let layout = PieceLayout::new(100, 500);
        let first = file(0, 0, 250);
        let second = file(1, 250, 250);

        prioritizer.focus(torrent.as_ref(), &layout, &second, 0, 0);
        prioritizer.focus(torrent.as_ref(), &layout, &first, 200, 0);
        prioritizer.focus(torrent.as_ref(), &layout, &first, 0, 0);

        assert_eq!(torrent.priority(PieceIndex::new(2)), PiecePriority::Now);
        assert_eq!(torrent.priority(PieceIndex::new(0)), PiecePriority::Now);
    }

    #[tokio::test]
    async fn test_eager_download_keeps_other_files_window_urgent() {
        let torrent = mock_torrent(MockSwarmEngine::multi_file(&[250, 250], 100)).await;
        let prioritizer = SequentialPrioritizer::new(100);
        let layout = PieceLayout::new(100, 500);
        let first = file(0, 0, 250);
        let second = file(1, 250, 250);
        let shared = PieceIndex::new(2);

        prioritizer.focus(torrent.as_ref(), &layout, &second, 0, 0);
        prioritizer.download_all(torrent.as_ref(), &layout, &first);
        assert_eq!(torrent.priority(shared), PiecePriority::Now);
        assert_eq!(torrent.priority(PieceIndex::new(0)), PiecePriority::High);

        prioritizer.focus(torrent.as_ref(), &layout, &second, 0, 0);
        assert_eq!(torrent.priority(shared), PiecePriority::Now);
    }

    #[tokio::test]
    async fn test_moving_window_restores_other_files_eager_level() {
        let torrent = mock_torrent(MockSwarmEngine::multi_file(&[250, 250], 100)).await;
        let prioritizer = SequentialPrioritizer::new(100);
        let layout = PieceLayout::new(100, 500);
        let first = file(0, 0, 250);
        let second = file(1, 250, 250);

        prioritizer.download_all(torrent.as_ref(), &layout, &first);
        prioritizer.focus(torrent.as_ref(), &layout, &second, 0, 0);
        assert_eq!(torrent.priority(PieceIndex::new(2)), PiecePriority::Now);

        prioritizer.focus(torrent.as_ref(), &layout, &second, 200, 0);
        assert_eq!(torrent.priority(PieceIndex::new(2)), PiecePriority::High);
        assert_eq!(torrent.priority(PieceIndex::new(3)), PiecePriority::Normal);
        assert_eq!(torrent.priority(PieceIndex::new(4)), PiecePriority::Now);
    }
}
