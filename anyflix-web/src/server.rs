//! Router construction and HTTP server lifecycle.

use std::future::Future;
use std::sync::Arc;

use anyflix_core::config::{AnyflixConfig, ConfigError};
use anyflix_core::swarm::SwarmEngine;
use anyflix_core::SessionManager;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    download_file, drop_session, file_fingerprint, file_stat, list_sessions, stream_file,
};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: SessionManager,
}

impl AppState {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

/// Errors starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Builds the API router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/torrent", get(list_sessions))
        .route("/api/torrent/{info_hash}/drop", get(drop_session))
        .route("/api/torrent/{info_hash}/{file_idx}/stream", get(stream_file))
        .route("/api/torrent/{info_hash}/{file_idx}/download", get(download_file))
        .route("/api/torrent/{info_hash}/{file_idx}/stat", get(file_stat))
        .route("/api/torrent/{info_hash}/{file_idx}/hash", get(file_fingerprint))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API until `shutdown` resolves, then closes every session.
///
/// # Errors
/// - `ServerError::Config` - Streaming configuration is invalid
/// - `ServerError::Bind` - Listener address unavailable
/// - `ServerError::Serve` - Accept loop failed
pub async fn run_server(
    config: &AnyflixConfig,
    engine: Arc<dyn SwarmEngine>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    config.validate()?;

    let manager = SessionManager::new(engine, &config.streaming);
    let app = router(AppState::new(manager.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(%addr, "anyflix streaming server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Err(err) = manager.shutdown().await {
        tracing::warn!(error = %err, "session shutdown incomplete");
    }
    tracing::info!("anyflix streaming server stopped");
    Ok(())
}
