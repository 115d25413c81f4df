//! Range streamer properties on fully and partially downloaded content.

use std::sync::Arc;
use std::time::Duration;

use anyflix_core::swarm::{PieceIndex, PiecePriority};
use anyflix_core::StreamError;
use proptest::prelude::*;

use crate::common::Fixture;

#[tokio::test]
async fn test_mid_file_chunk_scenario() {
    let fx = Fixture::manual(&[("movie.mp4", 20_000)], 1_000);
    fx.ready().await;

    let (window, payload) = fx.read_chunk(0, 5_000).await.unwrap();

    assert_eq!(window.content_range(), "bytes 5000-14999/20000");
    assert_eq!(payload.len(), 10_000);
    assert_eq!(payload, fx.expected(0, &window));
}

#[tokio::test]
async fn test_short_file_chunk_scenario() {
    let fx = Fixture::manual(&[("movie.mp4", 8_000)], 1_000);
    fx.ready().await;

    let (window, payload) = fx.read_chunk(0, 0).await.unwrap();

    assert_eq!(window.end, 7_999);
    assert_eq!(window.content_range(), "bytes 0-7999/8000");
    assert_eq!(payload.len(), 8_000);
    assert_eq!(payload, fx.expected(0, &window));
}

#[tokio::test]
async fn test_seek_backwards_after_far_read() {
    let fx = Fixture::manual(&[("long.mkv", 1_000_000)], 16_384);
    let torrent = fx.torrent().await;
    torrent.release_metadata();

    let far = {
        let fx = Arc::new(fx);
        let reader = Arc::clone(&fx);
        let pending = tokio::spawn(async move { reader.read_chunk(0, 900_000).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let far_piece = PieceIndex::new((900_000 / 16_384) as u32);
        assert_eq!(torrent.priority(far_piece), Some(PiecePriority::Now));
        assert!(!pending.is_finished());

        torrent.complete_all();
        let (window, payload) = pending.await.unwrap().unwrap();
        assert_eq!(payload, fx.expected(0, &window));
        fx
    };

    let (window, payload) = far.read_chunk(0, 10).await.unwrap();
    assert_eq!((window.start, window.end), (10, 10_009));
    assert_eq!(payload, far.expected(0, &window));

    let far_piece = PieceIndex::new((900_000 / 16_384) as u32);
    assert_eq!(torrent.priority(far_piece), Some(PiecePriority::Normal));
    assert_eq!(torrent.priority(PieceIndex::new(0)), Some(PiecePriority::Now));
}

#[tokio::test]
async fn test_only_requested_pieces_gate_the_chunk() {
    let fx = Arc::new(Fixture::manual(&[("movie.mp4", 100_000)], 1_000));
    let torrent = fx.torrent().await;
    torrent.release_metadata();

    // Everything except the chunk at 50_000..60_000 stays missing.
    for piece in 50..60 {
        torrent.complete_piece(PieceIndex::new(piece));
    }

    let (window, payload) = fx.read_chunk(0, 50_000).await.unwrap();
    assert_eq!(window.content_range(), "bytes 50000-59999/100000");
    assert_eq!(payload, fx.expected(0, &window));
    assert_eq!(torrent.completed_pieces(), 10);
}

#[tokio::test]
async fn test_files_sharing_a_piece_stream_their_own_bytes() {
    let fx = Fixture::manual(&[("a.mkv", 1_500), ("b.srt", 700), ("c.mkv", 2_300)], 1_000);
    fx.ready().await;

    for file_idx in 0..3 {
        let (window, payload) = fx.read_chunk(file_idx, 0).await.unwrap();
        assert_eq!(payload, fx.expected(file_idx as usize, &window));
    }
}

#[tokio::test]
async fn test_out_of_range_start() {
    let fx = Fixture::manual(&[("movie.mp4", 8_000)], 1_000);
    fx.ready().await;

    assert!(matches!(
        fx.read_chunk(0, 8_000).await,
        Err(StreamError::RangeNotSatisfiable {
            start: 8_000,
            file_length: 8_000
        })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_streamed_bytes_match_reference(
        lengths in proptest::collection::vec(1u64..30_000, 1..4),
        piece_length in 256u64..4_096,
        file_pick in 0usize..4,
        start_frac in 0.0f64..1.0,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let names = ["a.mkv", "b.mkv", "c.mkv"];
            let files: Vec<(&str, u64)> = lengths
                .iter()
                .enumerate()
                .map(|(i, len)| (names[i], *len))
                .collect();
            let fx = Fixture::manual(&files, piece_length);
            fx.ready().await;

            let file_idx = file_pick % files.len();
            let file_length = files[file_idx].1;
            let start = ((file_length as f64 * start_frac) as u64).min(file_length - 1);

            let (window, payload) = fx.read_chunk(file_idx as i64, start).await.unwrap();
            prop_assert_eq!(window.start, start);
            prop_assert!(window.end < file_length);
            prop_assert_eq!(payload.len() as u64, window.len());
            prop_assert_eq!(payload, fx.expected(file_idx, &window));
            Ok(())
        })?;
    }
}
