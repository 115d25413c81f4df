//! Command definitions for the session registry actor.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::StreamError;
use crate::session::{Session, SessionSummary};
use crate::swarm::InfoHash;

/// Requests understood by the registry actor.
pub enum RegistryCommand {
    /// Return the live session for an info hash, creating it on first access.
    GetOrCreate {
        info_hash: InfoHash,
        responder: oneshot::Sender<Result<Arc<Session>, StreamError>>,
    },
    /// Tear a session down. Unknown identifiers are a successful no-op.
    Drop {
        info_hash: InfoHash,
        responder: oneshot::Sender<bool>,
    },
    /// Summaries of every live session.
    List {
        responder: oneshot::Sender<Vec<SessionSummary>>,
    },
    /// Close every session and stop the actor.
    Shutdown { responder: oneshot::Sender<()> },
}
