//! Range streaming handler.

use anyflix_core::ByteRangeRequest;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;

use super::{parse_file_path, request_cancellation};
use crate::error::ApiError;
use crate::server::AppState;

/// `GET /api/torrent/{info_hash}/{file_idx}/stream`
///
/// Always answers `206 Partial Content` with one chunk starting at the
/// `Range` start (0 when absent). Clients advance by issuing new requests.
pub async fn stream_file(
    State(state): State<AppState>,
    Path((info_hash, file_idx)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (info_hash, file_idx) = parse_file_path(&info_hash, &file_idx)?;
    let range = ByteRangeRequest::parse(
        headers
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok()),
    );
    let (cancel, _guard) = request_cancellation();

    let chunk = state
        .manager
        .stream(info_hash, file_idx, range, &cancel)
        .await?;
    let content_type = mime_guess::from_path(&chunk.file.path).first_or_octet_stream();

    tracing::debug!(
        %info_hash,
        file_idx,
        start = chunk.window.start,
        end = chunk.window.end,
        content_type = %content_type,
        "stream response ready"
    );

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, chunk.window.len())
        .header(header::CONTENT_RANGE, chunk.window.content_range())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(chunk.body))
        .map_err(|err| ApiError::Response {
            reason: err.to_string(),
        })
}
