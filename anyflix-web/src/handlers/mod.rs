//! HTTP request handlers organized by functionality

pub mod api;
pub mod stream;

use anyflix_core::swarm::InfoHash;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::ApiError;

pub use api::{download_file, drop_session, file_fingerprint, file_stat, list_sessions};
pub use stream::stream_file;

/// Parses the `{info_hash}/{file_idx}` path segments.
///
/// Negative indices parse here and are rejected by the core as
/// `InvalidIndex`.
pub fn parse_file_path(info_hash: &str, file_idx: &str) -> Result<(InfoHash, i64), ApiError> {
    let info_hash = info_hash.parse::<InfoHash>()?;
    let file_idx = file_idx
        .parse::<i64>()
        .map_err(|_| ApiError::MalformedIndex {
            raw: file_idx.to_string(),
        })?;
    Ok((info_hash, file_idx))
}

/// Token cancelled when the returned guard drops with the request future.
pub(crate) fn request_cancellation() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

#[cfg(test)]
mod tests {
    use anyflix_core::StreamError;

    use super::*;

    #[test]
    fn test_parse_file_path() {
        let hash = "ab".repeat(20);
        let (info_hash, idx) = parse_file_path(&hash, "-3").unwrap();
        assert_eq!(info_hash.to_string(), hash);
        assert_eq!(idx, -3);

        assert!(matches!(
            parse_file_path("nothex", "0"),
            Err(ApiError::Stream(StreamError::InvalidInfoHash(_)))
        ));
        assert!(matches!(
            parse_file_path(&hash, "first"),
            Err(ApiError::MalformedIndex { .. })
        ));
    }

    #[test]
    fn test_request_cancellation_fires_on_drop() {
        let (token, guard) = request_cancellation();
        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());
    }
}
