//! Mapping of core errors onto HTTP responses.

use anyflix_core::StreamError;
use anyflix_core::swarm::InvalidInfoHash;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error returned by every API handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("invalid file index {raw:?}: expected an integer")]
    MalformedIndex { raw: String },

    #[error("failed to build response: {reason}")]
    Response { reason: String },
}

impl From<InvalidInfoHash> for ApiError {
    fn from(err: InvalidInfoHash) -> Self {
        ApiError::Stream(StreamError::from(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Stream(err) => stream_status(err),
            ApiError::MalformedIndex { .. } => StatusCode::BAD_REQUEST,
            ApiError::Response { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caused by the request itself rather than service state.
    pub fn is_user_error(&self) -> bool {
        match self {
            ApiError::Stream(err) => err.is_user_error(),
            ApiError::MalformedIndex { .. } => true,
            ApiError::Response { .. } => false,
        }
    }

    /// Same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Stream(err) if err.is_retryable())
    }
}

fn stream_status(err: &StreamError) -> StatusCode {
    match err {
        StreamError::InvalidIndex { .. } | StreamError::InvalidInfoHash(_) => {
            StatusCode::BAD_REQUEST
        }
        StreamError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        StreamError::MetadataUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        StreamError::SessionDropped { .. } => StatusCode::GONE,
        StreamError::StreamAborted { .. } | StreamError::EngineFailure(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if self.is_user_error() {
            tracing::debug!(%status, error = %message, "request rejected");
        } else if self.is_retryable() {
            tracing::warn!(%status, error = %message, "request failed, retryable");
        } else {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = Json(json!({ "error": true, "message": message }));
        let mut response = (status, body).into_response();

        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        if let ApiError::Stream(StreamError::RangeNotSatisfiable { file_length, .. }) = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{file_length}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}
