//! Actor owning the info hash → session table.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::commands::RegistryCommand;
use super::handle::SessionRegistryHandle;
use crate::error::StreamError;
use crate::session::Session;
use crate::swarm::{InfoHash, SwarmEngine};

/// Spawns the registry actor and returns its handle.
///
/// `readahead_bytes` configures the prioritizer of every session created.
///
/// # Examples
/// ```rust,no_run
/// # async fn demo(engine: std::sync::Arc<dyn anyflix_core::swarm::SwarmEngine>) {
/// use anyflix_core::registry::spawn_session_registry;
/// use anyflix_core::swarm::InfoHash;
///
/// let registry = spawn_session_registry(engine, 16 * 1024 * 1024);
/// let session = registry.get_or_create(InfoHash::new([0; 20])).await;
/// # }
/// ```
pub fn spawn_session_registry(
    engine: Arc<dyn SwarmEngine>,
    readahead_bytes: u64,
) -> SessionRegistryHandle {
    let (sender, receiver) = mpsc::channel(256);
    let registry = SessionRegistry {
        engine,
        readahead_bytes,
        sessions: HashMap::new(),
    };

    tokio::spawn(run_actor_loop(registry, receiver));

    SessionRegistryHandle::new(sender)
}

struct SessionRegistry {
    engine: Arc<dyn SwarmEngine>,
    readahead_bytes: u64,
    sessions: HashMap<InfoHash, Arc<Session>>,
}

impl SessionRegistry {
    async fn get_or_create(&mut self, info_hash: InfoHash) -> Result<Arc<Session>, StreamError> {
        if let Some(session) = self.sessions.get(&info_hash) {
            return Ok(Arc::clone(session));
        }

        let handle = self.engine.add(info_hash).await.inspect_err(|err| {
            tracing::error!(%info_hash, error = %err, "swarm engine refused content");
        })?;
        let session = Arc::new(Session::new(info_hash, handle, self.readahead_bytes));
        self.sessions.insert(info_hash, Arc::clone(&session));
        tracing::info!(%info_hash, live = self.sessions.len(), "session created");

        Ok(session)
    }

    async fn drop_session(&mut self, info_hash: InfoHash) -> bool {
        let Some(session) = self.sessions.remove(&info_hash) else {
            tracing::debug!(%info_hash, "drop of unknown session ignored");
            return false;
        };
        session.close().await;
        tracing::info!(%info_hash, live = self.sessions.len(), "session dropped");
        true
    }

    async fn close_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.close().await;
        }
    }
}

async fn run_actor_loop(
    mut registry: SessionRegistry,
    mut receiver: mpsc::Receiver<RegistryCommand>,
) {
    tracing::debug!("session registry actor started");

    while let Some(command) = receiver.recv().await {
        if !handle_command(&mut registry, command).await {
            break;
        }
    }

    registry.close_all().await;
    tracing::debug!("session registry actor stopped");
}

/// Returns false once the actor should stop.
async fn handle_command(registry: &mut SessionRegistry, command: RegistryCommand) -> bool {
    match command {
        RegistryCommand::GetOrCreate {
            info_hash,
            responder,
        } => {
            let result = registry.get_or_create(info_hash).await;
            let _ = responder.send(result);
        }

        RegistryCommand::Drop {
            info_hash,
            responder,
        } => {
            let existed = registry.drop_session(info_hash).await;
            let _ = responder.send(existed);
        }

        RegistryCommand::List { responder } => {
            let mut summaries: Vec<_> = registry.sessions.values().map(|s| s.summary()).collect();
            summaries.sort_by_key(|summary| summary.created_at);
            let _ = responder.send(summaries);
        }

        RegistryCommand::Shutdown { responder } => {
            registry.close_all().await;
            let _ = responder.send(());
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::swarm::test_mocks::MockSwarmEngine;

    fn registry_with_mock() -> (Arc<MockSwarmEngine>, SessionRegistryHandle) {
        let engine = Arc::new(MockSwarmEngine::new());
        let handle = spawn_session_registry(engine.clone(), 1_024);
        (engine, handle)
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let (engine, registry) = registry_with_mock();
        let info_hash = InfoHash::new([1; 20]);

        let first = registry.get_or_create(info_hash).await.unwrap();
        let second = registry.get_or_create(info_hash).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.add_count(info_hash), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_adds_once() {
        let (engine, registry) = registry_with_mock();
        let info_hash = InfoHash::new([2; 20]);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(info_hash).await.unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap());
        }

        assert_eq!(engine.add_count(info_hash), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test]
    async fn test_creation_does_not_wait_for_metadata() {
        let (engine, registry) = registry_with_mock();
        let info_hash = InfoHash::new([3; 20]);
        engine.register(info_hash, MockSwarmEngine::single_file(100, 10));

        let created =
            tokio::time::timeout(Duration::from_secs(1), registry.get_or_create(info_hash)).await;
        let session = created.expect("creation blocked").unwrap();
        assert!(session.cached_metadata().is_none());
    }

    #[tokio::test]
    async fn test_drop_then_recreate_is_fresh() {
        let (engine, registry) = registry_with_mock();
        let info_hash = InfoHash::new([4; 20]);

        let original = registry.get_or_create(info_hash).await.unwrap();
        assert!(registry.drop_session(info_hash).await.unwrap());
        assert!(original.is_closed());

        let recreated = registry.get_or_create(info_hash).await.unwrap();
        assert!(!Arc::ptr_eq(&original, &recreated));
        assert!(!recreated.is_closed());
        assert_eq!(engine.add_count(info_hash), 2);
    }

    #[tokio::test]
    async fn test_drop_unknown_is_noop() {
        let (_engine, registry) = registry_with_mock();
        let dropped = registry.drop_session(InfoHash::new([5; 20])).await;
        assert!(!dropped.unwrap());
    }

    #[tokio::test]
    async fn test_list_and_shutdown() {
        let (engine, registry) = registry_with_mock();
        let first = InfoHash::new([6; 20]);
        let second = InfoHash::new([7; 20]);
        registry.get_or_create(first).await.unwrap();
        registry.get_or_create(second).await.unwrap();

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|summary| !summary.metadata_ready));

        registry.shutdown().await.unwrap();
        assert!(engine.torrent(first).unwrap().is_closed());
        assert!(engine.torrent(second).unwrap().is_closed());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.get_or_create(first).await.is_err());
    }
}
