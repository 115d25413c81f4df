//! Errors returned by session operations.

use crate::swarm::{InfoHash, InvalidInfoHash, SwarmError};

/// Failure of a stream, stat, fingerprint or download operation.
///
/// Nothing here is retried inside the core. Callers decide using
/// `is_retryable`.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid file index {file_idx} for content with {file_count} files")]
    InvalidIndex { file_idx: i64, file_count: usize },

    #[error("metadata unavailable: {reason}")]
    MetadataUnavailable { reason: String },

    #[error("stream aborted: {reason}")]
    StreamAborted { reason: String },

    #[error("range start {start} not satisfiable for file of {file_length} bytes")]
    RangeNotSatisfiable { start: u64, file_length: u64 },

    #[error("session {info_hash} was dropped")]
    SessionDropped { info_hash: InfoHash },

    #[error(transparent)]
    InvalidInfoHash(#[from] InvalidInfoHash),

    #[error("swarm engine failure: {0}")]
    EngineFailure(#[from] SwarmError),
}

impl StreamError {
    /// Caused by bad client input rather than service state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidIndex { .. }
                | StreamError::InvalidInfoHash(_)
                | StreamError::RangeNotSatisfiable { .. }
        )
    }

    /// Same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::MetadataUnavailable { .. } | StreamError::SessionDropped { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
