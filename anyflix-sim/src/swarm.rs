//! In-memory swarm engine over a catalog of simulated content.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyflix_core::config::SimulationConfig;
use anyflix_core::swarm::{InfoHash, SwarmEngine, SwarmError, SwarmHandle};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::content::SimulatedContent;
use crate::torrent::SimulatedTorrent;

/// How simulated pieces become complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Only explicit calls on the torrent complete pieces
    Manual,
    /// A background task downloads by priority at `download_speed`
    Throttled,
}

/// Behavior of every torrent the swarm creates.
#[derive(Debug, Clone)]
pub struct SimulatedSwarmConfig {
    pub mode: CompletionMode,
    /// Bytes per second in `Throttled` mode
    pub download_speed: u64,
    pub metadata_delay: Duration,
    pub peer_count: usize,
    pub seed: u64,
}

impl SimulatedSwarmConfig {
    /// Hand-driven torrents for deterministic tests.
    pub fn manual() -> Self {
        Self {
            mode: CompletionMode::Manual,
            download_speed: 0,
            metadata_delay: Duration::ZERO,
            peer_count: 8,
            seed: 0,
        }
    }

    /// Self-driving torrents using the given simulation settings.
    pub fn throttled(config: &SimulationConfig) -> Self {
        Self {
            mode: CompletionMode::Throttled,
            download_speed: config.download_speed,
            metadata_delay: config.metadata_delay,
            peer_count: config.peer_count,
            seed: config.seed,
        }
    }
}

/// Swarm engine backed by in-memory content.
///
/// Identifiers missing from the catalog still get a handle, but its
/// metadata never arrives, like a swarm without peers.
pub struct SimulatedSwarm {
    config: SimulatedSwarmConfig,
    catalog: RwLock<HashMap<InfoHash, Arc<SimulatedContent>>>,
    torrents: Mutex<HashMap<InfoHash, Arc<SimulatedTorrent>>>,
    add_calls: Mutex<HashMap<InfoHash, usize>>,
}

impl SimulatedSwarm {
    pub fn new(config: SimulatedSwarmConfig) -> Self {
        Self {
            config,
            catalog: RwLock::new(HashMap::new()),
            torrents: Mutex::new(HashMap::new()),
            add_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Adds content to the catalog and returns its identifier.
    pub fn insert(&self, content: SimulatedContent) -> InfoHash {
        let info_hash = content.info_hash();
        tracing::info!(
            %info_hash,
            name = content.name(),
            bytes = content.total_length(),
            "content added to simulated catalog"
        );
        self.catalog.write().insert(info_hash, Arc::new(content));
        info_hash
    }

    /// Catalog entries ordered by name.
    pub fn catalog(&self) -> Vec<(InfoHash, Arc<SimulatedContent>)> {
        let mut entries: Vec<_> = self
            .catalog
            .read()
            .iter()
            .map(|(info_hash, content)| (*info_hash, Arc::clone(content)))
            .collect();
        entries.sort_by(|a, b| a.1.name().cmp(b.1.name()));
        entries
    }

    pub fn content(&self, info_hash: InfoHash) -> Option<Arc<SimulatedContent>> {
        self.catalog.read().get(&info_hash).cloned()
    }

    /// Most recently created torrent for `info_hash`.
    pub fn torrent(&self, info_hash: InfoHash) -> Option<Arc<SimulatedTorrent>> {
        self.torrents.lock().get(&info_hash).cloned()
    }

    /// Number of `add` calls seen for `info_hash`.
    pub fn add_count(&self, info_hash: InfoHash) -> usize {
        self.add_calls.lock().get(&info_hash).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarm {
    async fn add(&self, info_hash: InfoHash) -> Result<Arc<dyn SwarmHandle>, SwarmError> {
        *self.add_calls.lock().entry(info_hash).or_default() += 1;

        let mut torrents = self.torrents.lock();
        if let Some(existing) = torrents.get(&info_hash).filter(|t| !t.is_closed()) {
            return Ok(Arc::clone(existing) as Arc<dyn SwarmHandle>);
        }

        let content = self.content(info_hash);
        if content.is_none() {
            tracing::warn!(%info_hash, "unknown content, metadata will never arrive");
        }
        let torrent = Arc::new(SimulatedTorrent::start(info_hash, content, &self.config));
        torrents.insert(info_hash, Arc::clone(&torrent));
        Ok(torrent)
    }
}
