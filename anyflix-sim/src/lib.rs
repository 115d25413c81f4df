//! Anyflix Simulation - deterministic in-memory swarm engine.
//!
//! Implements the core's swarm engine traits without any network: content
//! comes from generated bytes or a local directory, metadata arrives after
//! a configurable delay and pieces complete either on command (`Manual`) or
//! at a throttled speed in the order the core's priorities ask for
//! (`Throttled`). Storage readers refuse bytes of pieces that are not yet
//! complete, so streaming code cannot cheat.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use anyflix_core::{AnyflixConfig, SessionManager};
//! use anyflix_sim::{SimulatedContent, SimulatedSwarm, SimulatedSwarmConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AnyflixConfig::default();
//! let swarm = Arc::new(SimulatedSwarm::new(SimulatedSwarmConfig::throttled(
//!     &config.simulation,
//! )));
//! let info_hash = swarm.insert(SimulatedContent::generated(
//!     "Demo",
//!     &[("demo.mp4", 8 * 1024 * 1024)],
//!     256 * 1024,
//!     config.simulation.seed,
//! )?);
//!
//! let manager = SessionManager::new(swarm, &config.streaming);
//! println!("serving {info_hash}");
//! # Ok(())
//! # }
//! ```

mod content;
mod swarm;
mod torrent;

pub use content::SimulatedContent;
pub use swarm::{CompletionMode, SimulatedSwarm, SimulatedSwarmConfig};
pub use torrent::SimulatedTorrent;

/// Errors building simulated content.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("piece length must be greater than zero")]
    InvalidPieceLength,

    #[error("content {name:?} has no files")]
    EmptyContent { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
