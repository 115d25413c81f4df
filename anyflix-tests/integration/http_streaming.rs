//! A player walking a file chunk by chunk over HTTP while it downloads.

use std::time::Duration;

use anyflix_web::{AppState, router};
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use crate::common::Fixture;

fn range_request(uri: &str, start: u64) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::RANGE, format!("bytes={start}-"))
        .body(Body::empty())
        .unwrap()
}

/// Total length from a `bytes s-e/total` header.
fn total_from_content_range(value: &str) -> u64 {
    value.rsplit('/').next().unwrap().parse().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequential_ranges_reassemble_file() {
    let fx = Fixture::throttled(&[("show.mkv", 45_000), ("show.srt", 1_200)], 4_096, 2_000_000);
    let app = router(AppState::new(fx.manager.clone()));
    let uri = format!("/api/torrent/{}/0/stream", fx.info_hash);

    let mut assembled = Vec::new();
    loop {
        let request = range_request(&uri, assembled.len() as u64);
        let response = tokio::time::timeout(Duration::from_secs(10), app.clone().oneshot(request))
            .await
            .expect("chunk never became available")
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

        let total = total_from_content_range(
            response.headers()[header::CONTENT_RANGE].to_str().unwrap(),
        );
        let length: usize = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(length <= 10_000);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), length);
        assembled.extend_from_slice(&body);

        if assembled.len() as u64 == total {
            break;
        }
    }

    assert_eq!(assembled, fx.content.file_bytes(0).unwrap().to_vec());

    let past_end = app
        .oneshot(range_request(&uri, assembled.len() as u64))
        .await
        .unwrap();
    assert_eq!(past_end.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_subtitle_file_in_same_content() {
    let fx = Fixture::manual(&[("show.mkv", 9_000), ("show.srt", 1_200)], 1_000);
    fx.ready().await;
    let app = router(AppState::new(fx.manager.clone()));
    let uri = format!("/api/torrent/{}/1/stream", fx.info_hash);

    let response = app.oneshot(range_request(&uri, 200)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        "bytes 200-1199/1200"
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let file = fx.content.file_bytes(1).unwrap();
    assert_eq!(body.as_ref(), &file[200..]);
}
