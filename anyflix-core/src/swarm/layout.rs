//! Piece geometry: mapping file byte spans onto torrent pieces.
//!
//! A torrent's files are concatenated into one payload that is cut into
//! fixed-size pieces. Only the final piece may be short. Pieces routinely
//! straddle file boundaries, so every file-relative computation first shifts
//! into torrent-absolute coordinates.

use std::ops::Range;
use std::path::PathBuf;

use super::PieceIndex;

/// One file inside a torrent payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Position in the torrent's file list
    pub index: usize,
    /// Byte offset of the file within the concatenated payload
    pub offset: u64,
    /// File length in bytes
    pub length: u64,
    /// Path relative to the torrent root
    pub path: PathBuf,
}

impl FileEntry {
    /// Torrent-absolute byte range covered by this file.
    pub fn span(&self) -> Range<u64> {
        self.offset..self.offset + self.length
    }
}

/// Everything the engine learns from the metadata exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmMetadata {
    pub name: String,
    pub piece_length: u64,
    pub files: Vec<FileEntry>,
}

impl SwarmMetadata {
    /// Total payload length across all files.
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|file| file.length).sum()
    }

    /// Piece geometry for this payload.
    pub fn layout(&self) -> PieceLayout {
        PieceLayout::new(self.piece_length, self.total_length())
    }
}

/// Fixed-size piece geometry over a payload of `total_length` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceLayout {
    piece_length: u64,
    total_length: u64,
}

impl PieceLayout {
    /// Creates a layout. `piece_length` must be non-zero.
    pub fn new(piece_length: u64, total_length: u64) -> Self {
        debug_assert!(piece_length > 0, "piece length must be non-zero");
        Self {
            piece_length,
            total_length,
        }
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of pieces in the payload.
    pub fn piece_count(&self) -> u32 {
        self.total_length.div_ceil(self.piece_length) as u32
    }

    /// Torrent-absolute byte range of `piece`, clamped at the payload end.
    pub fn piece_span(&self, piece: PieceIndex) -> Range<u64> {
        let start = piece.as_u32() as u64 * self.piece_length;
        let end = (start + self.piece_length).min(self.total_length);
        start.min(end)..end
    }

    /// Half-open range of pieces covering `len` bytes starting at `offset`.
    ///
    /// Both values are torrent-absolute. Empty when `len` is zero or the span
    /// starts past the payload.
    pub fn pieces_for(&self, offset: u64, len: u64) -> Range<PieceIndex> {
        let end = offset.saturating_add(len).min(self.total_length);
        if offset >= end {
            let at = PieceIndex::new((offset / self.piece_length) as u32);
            return at..at;
        }
        let first = (offset / self.piece_length) as u32;
        let last = ((end - 1) / self.piece_length) as u32;
        PieceIndex::new(first)..PieceIndex::new(last + 1)
    }

    /// Pieces holding any byte of `file`.
    pub fn file_pieces(&self, file: &FileEntry) -> Range<PieceIndex> {
        self.pieces_for(file.offset, file.length)
    }

    /// Number of bytes of `piece` that belong to `file`.
    pub fn overlap(&self, piece: PieceIndex, file: &FileEntry) -> u64 {
        let piece_span = self.piece_span(piece);
        let file_span = file.span();
        let start = piece_span.start.max(file_span.start);
        let end = piece_span.end.min(file_span.end);
        end.saturating_sub(start)
    }
}

/// Iterates a half-open piece range.
pub fn iter_pieces(range: Range<PieceIndex>) -> impl Iterator<Item = PieceIndex> {
    (range.start.as_u32()..range.end.as_u32()).map(PieceIndex::new)
}
