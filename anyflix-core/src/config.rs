//! Centralized configuration for Anyflix.
//!
//! Tunables for streaming, the HTTP listener and the simulated swarm live
//! here so no component hard-codes them.

use std::time::Duration;

/// Central configuration for all Anyflix components.
#[derive(Debug, Clone, Default)]
pub struct AnyflixConfig {
    pub streaming: StreamingConfig,
    pub server: ServerConfig,
    pub simulation: SimulationConfig,
}

/// Range streaming and prioritization settings.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Upper bound on bytes served per range request
    pub chunk_size: u64,
    /// Bytes ahead of the read offset marked as urgent
    pub readahead_bytes: u64,
    /// Buffer size used when copying from engine storage
    pub read_buffer_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10 * 1024 * 1024,      // 10 MiB
            readahead_bytes: 16 * 1024 * 1024, // 16 MiB
            read_buffer_size: 64 * 1024,       // 64 KiB
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2025,
        }
    }
}

/// Parameters for the in-memory swarm used in development and tests.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Simulated download speed in bytes per second
    pub download_speed: u64,
    /// Delay before a newly added swarm reports metadata
    pub metadata_delay: Duration,
    /// Peers the simulated swarm reports
    pub peer_count: usize,
    /// Seed for tie-breaking between equally urgent pieces
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            download_speed: 4 * 1024 * 1024, // 4 MiB/s
            metadata_delay: Duration::from_millis(500),
            peer_count: 24,
            seed: 42,
        }
    }
}

/// Rejected configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl AnyflixConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_parse::<u64>("ANYFLIX_CHUNK_SIZE") {
            config.streaming.chunk_size = size;
        }

        if let Some(bytes) = env_parse::<u64>("ANYFLIX_READAHEAD") {
            config.streaming.readahead_bytes = bytes;
        }

        if let Ok(host) = std::env::var("ANYFLIX_HOST") {
            config.server.host = host;
        }

        if let Some(port) = env_parse::<u16>("ANYFLIX_PORT") {
            config.server.port = port;
        }

        if let Some(speed) = env_parse::<u64>("ANYFLIX_SIM_SPEED") {
            config.simulation.download_speed = speed;
        }

        if let Some(seed) = env_parse::<u64>("ANYFLIX_SIM_SEED") {
            config.simulation.seed = seed;
        }

        config
    }

    /// Small chunks and an instant simulated swarm for fast tests.
    pub fn for_testing() -> Self {
        Self {
            streaming: StreamingConfig {
                chunk_size: 10_000,
                readahead_bytes: 4_096,
                read_buffer_size: 1_024,
            },
            server: ServerConfig::default(),
            simulation: SimulationConfig {
                download_speed: 64 * 1024 * 1024,
                metadata_delay: Duration::ZERO,
                peer_count: 4,
                seed: 7,
            },
        }
    }

    /// Checks values that would make streaming impossible.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` - Chunk size, readahead or read buffer is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streaming.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "chunk_size must be greater than zero".to_string(),
            });
        }
        if self.streaming.readahead_bytes == 0 {
            return Err(ConfigError::Invalid {
                reason: "readahead_bytes must be greater than zero".to_string(),
            });
        }
        if self.streaming.read_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "read_buffer_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}
