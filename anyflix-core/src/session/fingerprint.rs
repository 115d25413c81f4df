//! File fingerprint used to match subtitle records.

use tokio_util::sync::CancellationToken;

use super::Session;
use crate::error::{Result, StreamError};
use crate::swarm::{PieceIndex, SwarmError};

impl Session {
    /// Hex SHA-1 of the piece whose index equals `file_idx`.
    ///
    /// Subtitle services correlate on this value, so it is kept stable even
    /// though piece and file numbering are unrelated. See DESIGN.md before
    /// changing the derivation.
    ///
    /// # Errors
    ///
    /// - `StreamError::InvalidIndex` - File index out of bounds or past the last piece
    /// - `StreamError::EngineFailure` - Engine has no hash for the piece
    pub async fn fingerprint(&self, file_idx: i64, cancel: &CancellationToken) -> Result<String> {
        let (metadata, file) = self.file(file_idx, cancel).await?;
        let piece_count = metadata.layout().piece_count();
        let piece = u32::try_from(file.index)
            .ok()
            .filter(|index| *index < piece_count)
            .map(PieceIndex::new)
            .ok_or(StreamError::InvalidIndex {
                file_idx,
                file_count: metadata.files.len(),
            })?;

        let hash = self
            .handle()
            .piece_hash(piece)
            .ok_or(SwarmError::PieceUnavailable { index: piece })?;
        Ok(hex::encode(hash))
    }
}
