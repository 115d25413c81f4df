//! Registry dedup, teardown and bounds checks across crates.

use std::sync::Arc;
use std::time::Duration;

use anyflix_core::swarm::test_mocks::MockSwarmEngine;
use anyflix_core::swarm::{InfoHash, PieceIndex};
use anyflix_core::{AnyflixConfig, ByteRangeRequest, SessionManager, StreamError};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::common::Fixture;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_creates_one_session() {
    let fx = Fixture::manual(&[("movie.mp4", 10_000)], 1_000);

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let registry = fx.manager.registry().clone();
            let info_hash = fx.info_hash;
            tokio::spawn(async move { registry.get_or_create(info_hash).await.unwrap() })
        })
        .collect();

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.unwrap());
    }

    assert_eq!(fx.swarm.add_count(fx.info_hash), 1);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
}

#[tokio::test]
async fn test_drop_then_recreate_adds_again() {
    let fx = Fixture::manual(&[("movie.mp4", 10_000)], 1_000);
    let first = fx.ready().await;

    fx.manager.drop_session(fx.info_hash).await.unwrap();
    assert!(first.is_closed());

    let second = fx.torrent().await;
    assert_eq!(fx.swarm.add_count(fx.info_hash), 2);
    assert!(!second.is_closed());
    // Fresh swarm state, nothing carried over from the dropped session.
    assert_eq!(second.completed_pieces(), 0);
}

#[tokio::test]
async fn test_drop_unknown_is_success() {
    let fx = Fixture::manual(&[("movie.mp4", 10_000)], 1_000);

    fx.manager.drop_session(InfoHash::new([0x99; 20])).await.unwrap();
    fx.manager.drop_session(fx.info_hash).await.unwrap();
    assert_eq!(fx.swarm.add_count(fx.info_hash), 0);
}

#[tokio::test]
async fn test_drop_races_stream_waiting_for_pieces() {
    let fx = Arc::new(Fixture::manual(&[("movie.mp4", 50_000)], 1_000));
    fx.torrent().await.release_metadata();

    let pending = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move { fx.read_chunk(0, 0).await.map(|(window, _)| window) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    fx.manager.drop_session(fx.info_hash).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("stream stayed parked after drop")
        .unwrap();
    assert!(matches!(result, Err(StreamError::SessionDropped { .. })));
}

#[tokio::test]
async fn test_drop_mid_copy_truncates_cleanly() {
    let fx = Fixture::manual(&[("movie.mp4", 50_000)], 1_000);
    fx.ready().await;

    let chunk = fx
        .manager
        .stream(
            fx.info_hash,
            0,
            ByteRangeRequest::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let mut body = chunk.body;
    let first = body.next().await.unwrap().unwrap();
    assert!(!first.is_empty());

    fx.manager.drop_session(fx.info_hash).await.unwrap();

    assert!(body.next().await.unwrap().is_err());
    assert!(body.next().await.is_none());

    // The registry stays usable and serves a fresh session.
    let torrent = fx.ready().await;
    assert!(!torrent.is_closed());
    let (window, payload) = fx.read_chunk(0, 0).await.unwrap();
    assert_eq!(payload, fx.expected(0, &window));
}

#[tokio::test]
async fn test_invalid_index_makes_no_engine_calls() {
    let engine = Arc::new(MockSwarmEngine::new());
    let info_hash = InfoHash::new([0x31; 20]);
    engine.register(info_hash, MockSwarmEngine::multi_file(&[1_000, 2_000], 100));
    engine.torrent(info_hash).unwrap().release_metadata();
    let manager = SessionManager::new(engine.clone(), &AnyflixConfig::for_testing().streaming);
    let cancel = CancellationToken::new();

    for bad in [-5, -1, 2, 3, i64::MAX] {
        assert!(matches!(
            manager.stat(info_hash, bad, &cancel).await,
            Err(StreamError::InvalidIndex { .. })
        ));
        assert!(matches!(
            manager.fingerprint(info_hash, bad, &cancel).await,
            Err(StreamError::InvalidIndex { .. })
        ));
        assert!(matches!(
            manager.download_file(info_hash, bad, &cancel).await,
            Err(StreamError::InvalidIndex { .. })
        ));
        assert!(matches!(
            manager
                .stream(info_hash, bad, ByteRangeRequest::default(), &cancel)
                .await,
            Err(StreamError::InvalidIndex { .. })
        ));
    }

    let torrent = engine.torrent(info_hash).unwrap();
    assert!(torrent.priority_calls().is_empty());
    assert_eq!(engine.add_count(info_hash), 1);
}

#[tokio::test]
async fn test_content_without_files_rejects_every_index() {
    let engine = Arc::new(MockSwarmEngine::new());
    let info_hash = InfoHash::new([0x32; 20]);
    engine.register(info_hash, MockSwarmEngine::multi_file(&[], 100));
    engine.torrent(info_hash).unwrap().release_metadata();
    let manager = SessionManager::new(engine.clone(), &AnyflixConfig::for_testing().streaming);

    let result = manager.stat(info_hash, 0, &CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(StreamError::InvalidIndex { file_count: 0, .. })
    ));
}

#[tokio::test]
async fn test_stat_is_monotonic_under_download() {
    let fx = Fixture::throttled(&[("a.mkv", 120_000), ("b.mkv", 80_000)], 4_096, 4_000_000);
    let cancel = CancellationToken::new();
    fx.manager
        .download_file(fx.info_hash, 1, &cancel)
        .await
        .unwrap();

    let mut last = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let stat = fx.manager.stat(fx.info_hash, 1, &cancel).await.unwrap();
        assert!(stat.bytes_complete >= last, "bytes_complete went backwards");
        assert!(stat.bytes_complete <= stat.bytes_total);
        last = stat.bytes_complete;
        if stat.bytes_complete == stat.bytes_total {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "download stalled");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stat = fx.manager.stat(fx.info_hash, 1, &cancel).await.unwrap();
    assert_eq!(stat.total_peers, 12);
    assert!(stat.pieces_complete > 0);
}

#[tokio::test]
async fn test_fingerprint_is_piece_hash_at_file_index() {
    let fx = Fixture::manual(&[("a.mkv", 3_000), ("b.srt", 100)], 1_000);
    fx.ready().await;
    let cancel = CancellationToken::new();

    let fingerprint = fx
        .manager
        .fingerprint(fx.info_hash, 1, &cancel)
        .await
        .unwrap();
    let expected = fx.content.piece_hash(PieceIndex::new(1)).unwrap();
    assert_eq!(fingerprint.len(), 40);
    assert_eq!(
        fingerprint,
        expected.iter().map(|b| format!("{b:02x}")).collect::<String>()
    );
}
