//! Anyflix Core - torrent-backed streaming session manager
//!
//! Turns an external swarm engine into a byte-range streaming service:
//! one session per content identifier, metadata bootstrap, sequential
//! readahead prioritization, bounded chunk streaming, per-file stats and
//! explicit session lifecycle.

pub mod config;
pub mod error;
pub mod manager;
pub mod registry;
pub mod session;
pub mod streaming;
pub mod swarm;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{AnyflixConfig, ConfigError};
pub use error::{Result, StreamError};
pub use manager::SessionManager;
pub use session::{FileStat, Session, SessionSummary};
pub use streaming::{ByteRangeRequest, ChunkBody, ChunkStream, ChunkWindow};
pub use swarm::{InfoHash, SwarmEngine, SwarmError, SwarmHandle};
