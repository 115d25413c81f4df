//! JSON API handlers: stat, fingerprint, eager download, drop, listing.

use anyflix_core::swarm::InfoHash;
use anyflix_core::{FileStat, SessionSummary};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

use super::{parse_file_path, request_cancellation};
use crate::error::ApiError;
use crate::server::AppState;

/// Body of the fingerprint endpoint.
#[derive(Debug, Serialize)]
pub struct FingerprintResponse {
    pub fingerprint: String,
}

/// Acknowledgment for fire-and-forget operations.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub ok: bool,
    pub info_hash: InfoHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_idx: Option<i64>,
}

/// `GET /api/torrent/{info_hash}/{file_idx}/stat`
pub async fn file_stat(
    State(state): State<AppState>,
    Path((info_hash, file_idx)): Path<(String, String)>,
) -> Result<Json<FileStat>, ApiError> {
    let (info_hash, file_idx) = parse_file_path(&info_hash, &file_idx)?;
    let (cancel, _guard) = request_cancellation();

    let stat = state.manager.stat(info_hash, file_idx, &cancel).await?;
    Ok(Json(stat))
}

/// `GET /api/torrent/{info_hash}/{file_idx}/hash`
pub async fn file_fingerprint(
    State(state): State<AppState>,
    Path((info_hash, file_idx)): Path<(String, String)>,
) -> Result<Json<FingerprintResponse>, ApiError> {
    let (info_hash, file_idx) = parse_file_path(&info_hash, &file_idx)?;
    let (cancel, _guard) = request_cancellation();

    let fingerprint = state
        .manager
        .fingerprint(info_hash, file_idx, &cancel)
        .await?;
    Ok(Json(FingerprintResponse { fingerprint }))
}

/// `GET /api/torrent/{info_hash}/{file_idx}/download`
pub async fn download_file(
    State(state): State<AppState>,
    Path((info_hash, file_idx)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Ack>), ApiError> {
    let (info_hash, file_idx) = parse_file_path(&info_hash, &file_idx)?;
    let (cancel, _guard) = request_cancellation();

    state
        .manager
        .download_file(info_hash, file_idx, &cancel)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Ack {
            ok: true,
            info_hash,
            file_idx: Some(file_idx),
        }),
    ))
}

/// `GET /api/torrent/{info_hash}/drop`
pub async fn drop_session(
    State(state): State<AppState>,
    Path(info_hash): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let info_hash = info_hash.parse::<InfoHash>()?;
    state.manager.drop_session(info_hash).await?;
    Ok(Json(Ack {
        ok: true,
        info_hash,
        file_idx: None,
    }))
}

/// `GET /api/torrent`
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    Ok(Json(state.manager.sessions().await?))
}
