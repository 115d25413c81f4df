//! Swarm engine boundary.
//!
//! The session manager never speaks the peer wire protocol itself. It drives
//! an external swarm engine through the traits in this module: add content by
//! identifier, wait for metadata, steer piece priorities, watch completion and
//! read verified bytes back out of engine storage.

pub mod layout;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncSeek};
use tokio::sync::watch;

pub use layout::{FileEntry, PieceLayout, SwarmMetadata};

/// SHA-1 info hash identifying one content swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20 raw bytes.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Rejected textual info hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid info hash {input:?}: expected 40 hex characters")]
pub struct InvalidInfoHash {
    pub input: String,
}

impl FromStr for InfoHash {
    type Err = InvalidInfoHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidInfoHash {
            input: s.to_string(),
        };
        if s.len() != 40 {
            return Err(invalid());
        }
        let mut hash = [0u8; 20];
        hex::decode_to_slice(s, &mut hash).map_err(|_| invalid())?;
        Ok(Self(hash))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Zero-based index of a piece within a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Download urgency the engine should give a piece.
///
/// Ordered from "skip" to "needed right now". Engines treat these as hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PiecePriority {
    /// Do not download
    None,
    /// Engine default ordering
    #[default]
    Normal,
    /// Whole-file eager download
    High,
    /// Bytes the client is waiting on
    Now,
}

/// Swarm-wide counters copied from the engine's live stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmStats {
    pub total_peers: usize,
    pub pending_peers: usize,
    pub active_peers: usize,
    pub connected_seeders: usize,
    pub half_open_peers: usize,
    pub pieces_complete: usize,
}

/// Errors surfaced by a swarm engine.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("swarm handle closed")]
    Closed,

    #[error("no metadata available for swarm")]
    MetadataMissing,

    #[error("piece {index} is not available")]
    PieceUnavailable { index: PieceIndex },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Seekable byte reader over one file in engine storage.
pub trait SwarmReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SwarmReader for T {}

/// Entry point of a swarm engine.
///
/// `add` is idempotent per engine instance, but the session registry
/// still guarantees at most one call per live session.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Joins the swarm for `info_hash` without waiting for metadata.
    ///
    /// # Errors
    ///
    /// - `SwarmError::Storage` - Engine could not allocate storage for the swarm
    async fn add(&self, info_hash: InfoHash) -> Result<Arc<dyn SwarmHandle>, SwarmError>;
}

/// One joined swarm, exclusively owned by a session.
#[async_trait]
pub trait SwarmHandle: Send + Sync {
    /// Suspends until the file list and piece geometry are known.
    ///
    /// # Errors
    ///
    /// - `SwarmError::MetadataMissing` - Engine gave up on metadata exchange
    /// - `SwarmError::Closed` - Handle was closed while waiting
    async fn metadata(&self) -> Result<SwarmMetadata, SwarmError>;

    /// Applies `priority` to every piece in `pieces`. Advisory and non-blocking.
    fn set_priority(&self, pieces: Range<PieceIndex>, priority: PiecePriority);

    /// Whether a piece is downloaded and verified.
    fn is_piece_complete(&self, piece: PieceIndex) -> bool;

    /// Expected SHA-1 of a piece, once metadata is known.
    fn piece_hash(&self, piece: PieceIndex) -> Option<[u8; 20]>;

    /// Counter bumped every time any piece completes.
    fn completion_events(&self) -> watch::Receiver<u64>;

    /// Live peer counters.
    fn stats(&self) -> SwarmStats;

    /// Opens a reader positioned at the start of `file`.
    ///
    /// # Errors
    ///
    /// - `SwarmError::Closed` - Handle already released
    /// - `SwarmError::Storage` - File is not present in engine storage
    async fn open_reader(&self, file: &FileEntry) -> Result<Box<dyn SwarmReader>, SwarmError>;

    /// Releases disk and network resources. Safe to call more than once.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_display() {
        let hash = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef, 0x01, 0x23, 0x45, 0x67,
        ];
        let info_hash = InfoHash::new(hash);
        assert_eq!(
            info_hash.to_string(),
            "0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_info_hash_parse_accepts_uppercase() {
        let parsed: InfoHash = "0123456789ABCDEF0123456789ABCDEF01234567".parse().unwrap();
        assert_eq!(parsed.to_string(), "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_info_hash_parse_rejects_bad_input() {
        assert!("abc".parse::<InfoHash>().is_err());
        assert!("zz23456789abcdef0123456789abcdef01234567".parse::<InfoHash>().is_err());
        assert!(
            "0123456789abcdef0123456789abcdef0123456789"
                .parse::<InfoHash>()
                .is_err()
        );
    }

    #[test]
    fn test_info_hash_serde_as_hex() {
        let info_hash = InfoHash::new([0xab; 20]);
        let json = serde_json::to_string(&info_hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(20)));
        let back: InfoHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info_hash);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(PiecePriority::None < PiecePriority::Normal);
        assert!(PiecePriority::Normal < PiecePriority::High);
        assert!(PiecePriority::High < PiecePriority::Now);
    }
}
