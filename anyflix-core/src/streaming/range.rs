//! Byte range parsing and chunk window arithmetic.

use crate::error::{Result, StreamError};

/// Client-requested start (and optional end) inside one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRangeRequest {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRangeRequest {
    /// Request starting at `start` with no explicit end.
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Parses a `Range` header value.
    ///
    /// Accepts `bytes=S-` and `bytes=S-E`; only the first range of a list is
    /// used. Anything else, including suffix ranges, reads from offset 0.
    ///
    /// # Examples
    /// ```
    /// use anyflix_core::streaming::ByteRangeRequest;
    ///
    /// let request = ByteRangeRequest::parse(Some("bytes=100-199"));
    /// assert_eq!((request.start, request.end), (100, Some(199)));
    /// assert_eq!(ByteRangeRequest::parse(None).start, 0);
    /// ```
    pub fn parse(header: Option<&str>) -> Self {
        header.and_then(Self::parse_spec).unwrap_or_default()
    }

    fn parse_spec(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?;
        let first = spec.split(',').next()?.trim();
        let (start, end) = first.split_once('-')?;
        let start = start.trim().parse::<u64>().ok()?;
        let end = match end.trim() {
            "" => None,
            end => Some(end.parse::<u64>().ok()?),
        };
        Some(Self { start, end })
    }
}

/// Inclusive byte window served by one response.
///
/// `end = min(start + chunk_size - 1, file_length - 1)`, further capped by a
/// smaller client-supplied end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub start: u64,
    pub end: u64,
    pub file_length: u64,
}

impl ChunkWindow {
    /// Computes the window for a request against a file of `file_length`.
    ///
    /// A requested end before `start` is ignored.
    ///
    /// # Errors
    /// - `StreamError::RangeNotSatisfiable` - `start` at or past the end of the file
    pub fn new(
        start: u64,
        requested_end: Option<u64>,
        chunk_size: u64,
        file_length: u64,
    ) -> Result<Self> {
        if start >= file_length {
            return Err(StreamError::RangeNotSatisfiable { start, file_length });
        }

        let chunk_end = start.saturating_add(chunk_size.max(1) - 1);
        let mut end = chunk_end.min(file_length - 1);
        if let Some(requested) = requested_end.filter(|requested| *requested >= start) {
            end = end.min(requested);
        }

        Ok(Self {
            start,
            end,
            file_length,
        })
    }

    /// Number of bytes in the window.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value, e.g. `bytes 5000-14999/20000`.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.file_length)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_range_header_forms() {
        assert_eq!(
            ByteRangeRequest::parse(Some("bytes=100-199")),
            ByteRangeRequest {
                start: 100,
                end: Some(199)
            }
        );
        assert_eq!(
            ByteRangeRequest::parse(Some("bytes=500-")),
            ByteRangeRequest::from_start(500)
        );
        assert_eq!(
            ByteRangeRequest::parse(Some("bytes=10-20, 30-40")),
            ByteRangeRequest {
                start: 10,
                end: Some(20)
            }
        );
    }

    #[test]
    fn test_parse_range_header_fallbacks() {
        for header in [None, Some("invalid"), Some("bytes=-500"), Some("bytes=x-1")] {
            assert_eq!(ByteRangeRequest::parse(header), ByteRangeRequest::default());
        }
    }

    #[test]
    fn test_window_mid_file() {
        let window = ChunkWindow::new(5_000, None, 10_000, 20_000).unwrap();
        assert_eq!(window.content_range(), "bytes 5000-14999/20000");
        assert_eq!(window.len(), 10_000);
    }

    #[test]
    fn test_window_clamps_to_short_file() {
        let window = ChunkWindow::new(0, None, 10_000, 8_000).unwrap();
        assert_eq!(window.end, 7_999);
        assert_eq!(window.content_range(), "bytes 0-7999/8000");
        assert_eq!(window.len(), 8_000);
    }

    #[test]
    fn test_window_honors_smaller_requested_end() {
        let window = ChunkWindow::new(100, Some(199), 10_000, 20_000).unwrap();
        assert_eq!((window.start, window.end), (100, 199));

        let capped = ChunkWindow::new(100, Some(19_999), 1_000, 20_000).unwrap();
        assert_eq!(capped.end, 1_099);

        let backwards = ChunkWindow::new(100, Some(50), 1_000, 20_000).unwrap();
        assert_eq!(backwards.end, 1_099);
    }

    #[test]
    fn test_window_rejects_start_past_end() {
        assert!(matches!(
            ChunkWindow::new(8_000, None, 10_000, 8_000),
            Err(StreamError::RangeNotSatisfiable {
                start: 8_000,
                file_length: 8_000
            })
        ));
        assert!(ChunkWindow::new(0, None, 10_000, 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_window_stays_inside_file_and_chunk(
            file_length in 1u64..1_000_000,
            chunk_size in 1u64..100_000,
            start_frac in 0.0f64..1.0,
        ) {
            let start = ((file_length as f64) * start_frac) as u64;
            let start = start.min(file_length - 1);
            let window = ChunkWindow::new(start, None, chunk_size, file_length).unwrap();

            prop_assert!(window.start <= window.end);
            prop_assert!(window.end < file_length);
            prop_assert!(window.len() <= chunk_size);
            prop_assert!(window.len() == chunk_size || window.end == file_length - 1);
        }
    }
}
