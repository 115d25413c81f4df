//! One bounded chunk per request, gated only on the pieces it covers.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{FutureExt, Stream};
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use super::range::{ByteRangeRequest, ChunkWindow};
use crate::error::{Result, StreamError};
use crate::session::Session;
use crate::swarm::{FileEntry, InfoHash, SwarmError, SwarmReader};

/// Serves byte-range requests from session storage.
#[derive(Debug, Clone, Copy)]
pub struct RangeStreamer {
    chunk_size: u64,
    read_buffer_size: usize,
}

/// Ready-to-send chunk: window metadata plus a lazily read body.
pub struct ChunkStream {
    pub window: ChunkWindow,
    pub file: FileEntry,
    pub body: ChunkBody,
}

impl RangeStreamer {
    pub fn new(chunk_size: u64, read_buffer_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            read_buffer_size: read_buffer_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Resolves the chunk for `request`, moves the readahead window and
    /// suspends until every byte of the chunk is locally verified.
    ///
    /// The returned body streams exactly `window.len()` bytes and is never
    /// buffered whole.
    ///
    /// # Errors
    /// - `StreamError::InvalidIndex` - File index out of bounds
    /// - `StreamError::RangeNotSatisfiable` - Start at or past the end of the file
    /// - `StreamError::MetadataUnavailable` - Cancelled before metadata arrived
    /// - `StreamError::StreamAborted` - Cancelled while waiting for pieces
    /// - `StreamError::SessionDropped` - Session torn down mid-request
    /// - `StreamError::EngineFailure` - Engine storage could not be read
    pub async fn open_chunk(
        &self,
        session: &Session,
        file_idx: i64,
        request: ByteRangeRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        let (metadata, file) = session.file(file_idx, cancel).await?;
        let window = ChunkWindow::new(request.start, request.end, self.chunk_size, file.length)?;
        let layout = metadata.layout();

        session.focus(&layout, &file, window.start, window.len());

        let needed = layout.pieces_for(file.offset + window.start, window.len());
        session
            .wait_for_pieces(needed, cancel)
            .await
            .inspect_err(|err| {
                tracing::warn!(
                    info_hash = %session.info_hash(),
                    file_idx,
                    start = window.start,
                    end = window.end,
                    error = %err,
                    "chunk wait ended early"
                );
            })?;

        let mut reader = session.open_reader(&file).await?;
        reader
            .seek(SeekFrom::Start(window.start))
            .await
            .map_err(SwarmError::Io)?;

        tracing::debug!(
            info_hash = %session.info_hash(),
            file_idx,
            start = window.start,
            end = window.end,
            "serving chunk"
        );

        let body = ChunkBody {
            inner: ReaderStream::with_capacity(reader.take(window.len()), self.read_buffer_size),
            remaining: window.len(),
            closed: Box::pin(session.closed()),
            info_hash: session.info_hash(),
            file_idx: file.index,
            finished: false,
        };

        Ok(ChunkStream { window, file, body })
    }
}

/// Body of one chunk response.
///
/// Yields exactly the window's bytes, or an error item if the copy cannot
/// finish. Once headers are committed a failure is only visible to the client
/// as a short read.
pub struct ChunkBody {
    inner: ReaderStream<Take<Box<dyn SwarmReader>>>,
    remaining: u64,
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
    info_hash: InfoHash,
    file_idx: usize,
    finished: bool,
}

impl ChunkBody {
    /// Bytes not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn abort(&mut self, reason: String) -> io::Error {
        self.finished = true;
        let err = StreamError::StreamAborted { reason };
        tracing::warn!(
            info_hash = %self.info_hash,
            file_idx = self.file_idx,
            remaining = self.remaining,
            error = %err,
            "chunk copy aborted"
        );
        io::Error::other(err)
    }
}

impl Stream for ChunkBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        if this.closed.poll_unpin(cx).is_ready() {
            let reason = format!("session {} dropped mid-copy", this.info_hash);
            return Poll::Ready(Some(Err(this.abort(reason))));
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.remaining = this.remaining.saturating_sub(bytes.len() as u64);
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(err))) => {
                let reason = format!("storage read failed: {err}");
                Poll::Ready(Some(Err(this.abort(reason))))
            }
            Poll::Ready(None) if this.remaining > 0 => {
                let reason = format!("storage ended {} bytes early", this.remaining);
                let err = this.abort(reason);
                Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::UnexpectedEof, err))))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ChunkBody {
    fn drop(&mut self) {
        if !self.finished && self.remaining > 0 {
            tracing::debug!(
                info_hash = %self.info_hash,
                file_idx = self.file_idx,
                remaining = self.remaining,
                "chunk body dropped before completion"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::swarm::test_mocks::{MockSwarmEngine, MockTorrent, mock_byte};
    use crate::swarm::{PieceIndex, PiecePriority, SwarmEngine, SwarmHandle};

    async fn ready_session(lengths: &[u64], piece_length: u64) -> (Arc<Session>, Arc<MockTorrent>) {
        let engine = MockSwarmEngine::new();
        let info_hash = InfoHash::new([0x42; 20]);
        engine.register(info_hash, MockSwarmEngine::multi_file(lengths, piece_length));
        let torrent = engine.torrent(info_hash).unwrap();
        torrent.release_metadata();
        let handle = engine.add(info_hash).await.unwrap();
        (Arc::new(Session::new(info_hash, handle, 1_000)), torrent)
    }

    async fn collect(body: ChunkBody) -> io::Result<Vec<u8>> {
        let mut body = body;
        let mut out = Vec::new();
        while let Some(bytes) = body.next().await {
            out.extend_from_slice(&bytes?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_chunk_window_and_payload() {
        let (session, torrent) = ready_session(&[20_000], 1_000).await;
        torrent.complete_all();
        let streamer = RangeStreamer::new(10_000, 512);

        let chunk = streamer
            .open_chunk(
                &session,
                0,
                ByteRangeRequest::from_start(5_000),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(chunk.window.content_range(), "bytes 5000-14999/20000");
        let payload = collect(chunk.body).await.unwrap();
        assert_eq!(payload.len(), 10_000);
        let expected: Vec<u8> = (5_000..15_000).map(mock_byte).collect();
        assert_eq!(payload, expected);
    }

    #[tokio::test]
    async fn test_second_file_reads_its_own_bytes() {
        let (session, torrent) = ready_session(&[1_500, 3_000], 1_000).await;
        torrent.complete_all();
        let streamer = RangeStreamer::new(10_000, 256);

        let chunk = streamer
            .open_chunk(&session, 1, ByteRangeRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(chunk.window.content_range(), "bytes 0-2999/3000");
        let payload = collect(chunk.body).await.unwrap();
        let expected: Vec<u8> = (1_500..4_500).map(mock_byte).collect();
        assert_eq!(payload, expected);
    }

    #[tokio::test]
    async fn test_waits_only_for_requested_pieces() {
        let (session, torrent) = ready_session(&[10_000], 1_000).await;
        let streamer = RangeStreamer::new(2_000, 256);

        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let chunk = streamer
                    .open_chunk(
                        &session,
                        0,
                        ByteRangeRequest::from_start(4_000),
                        &CancellationToken::new(),
                    )
                    .await?;
                Ok::<_, StreamError>(chunk.window)
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(torrent.priority(PieceIndex::new(4)), PiecePriority::Now);
        assert!(!pending.is_finished());

        torrent.complete_piece(PieceIndex::new(4));
        torrent.complete_piece(PieceIndex::new(5));
        let window = pending.await.unwrap().unwrap();
        assert_eq!((window.start, window.end), (4_000, 5_999));
        assert!(!torrent.is_piece_complete(PieceIndex::new(0)));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_aborts() {
        let (session, _torrent) = ready_session(&[10_000], 1_000).await;
        let streamer = RangeStreamer::new(2_000, 256);
        let cancel = CancellationToken::new();

        let pending = {
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                streamer
                    .open_chunk(&session, 0, ByteRangeRequest::default(), &cancel)
                    .await
                    .map(|chunk| chunk.window)
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert!(matches!(
            pending.await.unwrap(),
            Err(StreamError::StreamAborted { .. })
        ));
    }

    #[tokio::test]
    async fn test_range_past_end_is_rejected_before_priorities() {
        let (session, torrent) = ready_session(&[8_000], 1_000).await;
        let streamer = RangeStreamer::new(10_000, 256);

        let result = streamer
            .open_chunk(
                &session,
                0,
                ByteRangeRequest::from_start(8_000),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(StreamError::RangeNotSatisfiable { .. })
        ));
        assert!(torrent.priority_calls().is_empty());
    }

    #[tokio::test]
    async fn test_drop_mid_copy_truncates_body() {
        let (session, torrent) = ready_session(&[10_000], 1_000).await;
        torrent.complete_all();
        let streamer = RangeStreamer::new(10_000, 100);

        let chunk = streamer
            .open_chunk(&session, 0, ByteRangeRequest::default(), &CancellationToken::new())
            .await
            .unwrap();
        let mut body = chunk.body;
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 100);

        session.close().await;
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
        assert_eq!(body.remaining(), 9_900);
    }
}
