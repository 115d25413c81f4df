//! Anyflix Web - HTTP surface of the streaming session manager
//!
//! Exposes one route per session operation under `/api/torrent`. Each
//! request gets its own cancellation token that fires when the request is
//! abandoned, so a client hanging up frees any metadata or piece wait.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, ServerError, router, run_server};
