//! Handle for communicating with the session registry actor.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::commands::RegistryCommand;
use crate::error::StreamError;
use crate::session::{Session, SessionSummary};
use crate::swarm::{InfoHash, SwarmError};

/// Cloneable async front for the registry actor.
#[derive(Clone)]
pub struct SessionRegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

fn registry_gone() -> StreamError {
    StreamError::EngineFailure(SwarmError::Closed)
}

impl SessionRegistryHandle {
    /// Creates a new handle with the given command sender.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Returns the live session for `info_hash`, adding it to the engine on
    /// first use.
    ///
    /// Concurrent first accesses all receive the same session and the engine
    /// sees exactly one add. Does not wait for metadata.
    ///
    /// # Errors
    /// - `StreamError::EngineFailure` - Engine refused the content or registry stopped
    pub async fn get_or_create(&self, info_hash: InfoHash) -> Result<Arc<Session>, StreamError> {
        let (responder, rx) = oneshot::channel();
        let cmd = RegistryCommand::GetOrCreate {
            info_hash,
            responder,
        };

        self.sender.send(cmd).await.map_err(|_| registry_gone())?;

        rx.await.map_err(|_| registry_gone())?
    }

    /// Removes and closes the session. Returns whether one existed.
    pub async fn drop_session(&self, info_hash: InfoHash) -> Result<bool, StreamError> {
        let (responder, rx) = oneshot::channel();
        let cmd = RegistryCommand::Drop {
            info_hash,
            responder,
        };

        self.sender.send(cmd).await.map_err(|_| registry_gone())?;

        rx.await.map_err(|_| registry_gone())
    }

    /// Summaries of all live sessions, oldest first.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, StreamError> {
        let (responder, rx) = oneshot::channel();
        let cmd = RegistryCommand::List { responder };

        self.sender.send(cmd).await.map_err(|_| registry_gone())?;

        rx.await.map_err(|_| registry_gone())
    }

    /// Closes every session and stops the actor.
    pub async fn shutdown(&self) -> Result<(), StreamError> {
        let (responder, rx) = oneshot::channel();
        let cmd = RegistryCommand::Shutdown { responder };

        self.sender.send(cmd).await.map_err(|_| registry_gone())?;

        rx.await.map_err(|_| registry_gone())
    }
}
