//! Callers walking away from metadata and piece waits.

use std::time::Duration;

use anyflix_core::swarm::{InfoHash, PieceIndex};
use anyflix_core::{ByteRangeRequest, StreamError};
use anyflix_web::{AppState, router};
use axum::body::Body;
use axum::http::Request;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::common::Fixture;

#[tokio::test]
async fn test_cancel_while_waiting_for_unknown_metadata() {
    let fx = Fixture::manual(&[("movie.mp4", 1_000)], 100);
    let unknown = InfoHash::new([0xee; 20]);
    let cancel = CancellationToken::new();

    let pending = {
        let manager = fx.manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.stat(unknown, 0, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    cancel.cancel();
    let result = pending.await.unwrap();
    assert!(matches!(
        result,
        Err(StreamError::MetadataUnavailable { .. })
    ));
    // The session outlives the caller that gave up on it.
    assert_eq!(fx.manager.sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_pieces() {
    let fx = Fixture::manual(&[("movie.mp4", 20_000)], 1_000);
    fx.torrent().await.release_metadata();
    let cancel = CancellationToken::new();

    let pending = {
        let manager = fx.manager.clone();
        let cancel = cancel.clone();
        let info_hash = fx.info_hash;
        tokio::spawn(async move {
            manager
                .stream(info_hash, 0, ByteRangeRequest::from_start(5_000), &cancel)
                .await
                .map(|chunk| chunk.window)
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    assert!(matches!(
        pending.await.unwrap(),
        Err(StreamError::StreamAborted { .. })
    ));

    // A later request on the same session still completes.
    fx.ready().await;
    let (window, payload) = fx.read_chunk(0, 5_000).await.unwrap();
    assert_eq!(payload, fx.expected(0, &window));
    assert_eq!(fx.swarm.add_count(fx.info_hash), 1);
}

#[tokio::test]
async fn test_one_waiter_cancelling_leaves_others_waiting() {
    let fx = Fixture::manual(&[("a.mkv", 3_000), ("b.srt", 500)], 1_000);
    let torrent = fx.torrent().await;

    let quitter = CancellationToken::new();
    let patient = CancellationToken::new();

    let first = {
        let manager = fx.manager.clone();
        let quitter = quitter.clone();
        let info_hash = fx.info_hash;
        tokio::spawn(async move { manager.stat(info_hash, 0, &quitter).await })
    };
    let second = {
        let manager = fx.manager.clone();
        let patient = patient.clone();
        let info_hash = fx.info_hash;
        tokio::spawn(async move { manager.stat(info_hash, 1, &patient).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    quitter.cancel();
    assert!(matches!(
        first.await.unwrap(),
        Err(StreamError::MetadataUnavailable { .. })
    ));
    assert!(!second.is_finished());

    torrent.release_metadata();
    let stat = tokio::time::timeout(Duration::from_secs(1), second)
        .await
        .expect("waiter never saw metadata")
        .unwrap()
        .unwrap();
    assert_eq!(stat.bytes_total, 500);
    assert_eq!(stat.bytes_complete, 0);
}

#[tokio::test]
async fn test_abandoned_http_request_releases_its_wait() {
    let fx = Fixture::manual(&[("movie.mp4", 1_000)], 100);
    let app = router(AppState::new(fx.manager.clone()));
    let unknown = InfoHash::new([0xab; 20]);

    let request = Request::builder()
        .uri(format!("/api/torrent/{unknown}/0/stream"))
        .body(Body::empty())
        .unwrap();
    let pending = tokio::spawn(app.clone().oneshot(request));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let dead = fx.swarm.torrent(unknown).unwrap();
    assert_eq!(dead.metadata_waiters(), 1);
    assert!(!pending.is_finished());

    // Client goes away.
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());
    assert_eq!(dead.metadata_waiters(), 0);

    // Known content on the same server is unaffected.
    fx.ready().await;
    let request = Request::builder()
        .uri(format!("/api/torrent/{}/0/stat", fx.info_hash))
        .body(Body::empty())
        .unwrap();
    let response = tokio::time::timeout(Duration::from_secs(1), app.oneshot(request))
        .await
        .expect("stat blocked behind abandoned request")
        .unwrap();
    assert!(response.status().is_success());

    let sessions = fx.manager.sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn test_stat_answers_while_stream_waits_for_pieces() {
    let fx = Fixture::manual(&[("movie.mp4", 30_000)], 1_000);
    let torrent = fx.torrent().await;
    torrent.release_metadata();
    torrent.complete_piece(PieceIndex::new(29));

    let cancel = CancellationToken::new();
    let parked = {
        let manager = fx.manager.clone();
        let cancel = cancel.clone();
        let info_hash = fx.info_hash;
        tokio::spawn(async move {
            manager
                .stream(info_hash, 0, ByteRangeRequest::from_start(0), &cancel)
                .await
                .map(|chunk| chunk.window)
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!parked.is_finished());

    let stat = tokio::time::timeout(
        Duration::from_millis(500),
        fx.manager.stat(fx.info_hash, 0, &CancellationToken::new()),
    )
    .await
    .expect("stat waited on the parked stream")
    .unwrap();
    assert_eq!(stat.bytes_complete, 1_000);
    assert_eq!(stat.bytes_total, 30_000);
    assert!(!parked.is_finished());

    torrent.complete_all();
    let window = tokio::time::timeout(Duration::from_secs(1), parked)
        .await
        .expect("stream never resumed")
        .unwrap()
        .unwrap();
    assert_eq!(window.content_range(), "bytes 0-9999/30000");
}
