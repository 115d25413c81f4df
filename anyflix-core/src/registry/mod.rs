//! Session registry: one live session per info hash.
//!
//! The identifier → session table is owned by a single actor task. Handles
//! talk to it over a channel, so first-access deduplication needs no shared
//! locks: commands are applied one at a time in arrival order.

mod actor;
mod commands;
mod handle;

pub use actor::spawn_session_registry;
pub use commands::RegistryCommand;
pub use handle::SessionRegistryHandle;
