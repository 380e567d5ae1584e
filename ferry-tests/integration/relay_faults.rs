//! Relay behaviour under misbehaving upstream transfers.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, header};
use axum::response::Response;
use ferry_core::config::RelayConfig;
use ferry_core::{MediaKind, MediaReference, StreamRelay};
use ferry_sim::{FaultPlan, InMemoryBackend};
use futures::StreamExt;

const CLIP: MediaReference = MediaReference {
    container_id: -100,
    item_id: 1,
};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

async fn relay_with(faults: FaultPlan, chunk_size: usize) -> (StreamRelay, InMemoryBackend) {
    let backend = InMemoryBackend::new();
    backend
        .add_document(CLIP, "clip.mp4", "video/mp4", payload(1000))
        .await;
    backend.set_faults(CLIP, faults).await;

    let relay = StreamRelay::new(Arc::new(backend.clone()), &RelayConfig { chunk_size });
    (relay, backend)
}

/// Drains a response body, returning the bytes received and whether the
/// body ended with an error.
async fn drain(response: Response) -> (Vec<u8>, bool) {
    let mut body = response.into_body().into_data_stream();
    let mut bytes = Vec::new();
    while let Some(item) = body.next().await {
        match item {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(_) => return (bytes, true),
        }
    }
    (bytes, false)
}

#[tokio::test]
async fn test_over_delivering_upstream_is_truncated() {
    let (relay, _) = relay_with(FaultPlan::default().over_deliver(300), 64).await;

    let response = relay.relay(CLIP, Some("bytes=100-199")).await.unwrap();
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");

    let (bytes, failed) = drain(response).await;
    assert!(!failed);
    assert_eq!(bytes, payload(1000)[100..200].to_vec());
}

#[tokio::test]
async fn test_mid_stream_failure_truncates_body() {
    let (relay, backend) = relay_with(FaultPlan::default().fail_after(300), 64).await;

    let response = relay.relay(CLIP, None).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");

    let (bytes, failed) = drain(response).await;
    assert!(failed);
    assert_eq!(bytes, payload(1000)[..300].to_vec());
    assert_eq!(backend.active_transfers(), 0);
}

#[tokio::test]
async fn test_short_upstream_ends_body_early() {
    let backend = InMemoryBackend::new();
    backend
        .insert(
            CLIP,
            MediaKind::Document {
                filename: Some("clip.mp4".to_string()),
                mime_type: Some("video/mp4".to_string()),
                size: 1000,
            },
            payload(400),
        )
        .await;
    let relay = StreamRelay::new(Arc::new(backend), &RelayConfig { chunk_size: 128 });

    let response = relay.relay(CLIP, None).await.unwrap();
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");

    let (bytes, _) = drain(response).await;
    assert_eq!(bytes.len(), 400);
}

#[tokio::test]
async fn test_open_failure_is_bad_gateway() {
    let (relay, _) = relay_with(FaultPlan::default().fail_open(), 64).await;

    let error = relay.relay(CLIP, None).await.err().unwrap();
    assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_lookup_failure_is_bad_request() {
    let (relay, backend) = relay_with(FaultPlan::default().fail_lookup(), 64).await;

    let error = relay.relay(CLIP, None).await.err().unwrap();
    assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error.code(), "upstream_error");
    assert_eq!(backend.opened_transfers(), 0);
}

#[tokio::test]
async fn test_shutdown_aborts_stalled_stream() {
    let (relay, backend) = relay_with(FaultPlan::default().stall_after(64), 64).await;

    let response = relay.relay(CLIP, None).await.unwrap();
    let mut body = response.into_body().into_data_stream();
    assert_eq!(body.next().await.unwrap().unwrap().len(), 64);

    relay.shutdown();
    let next = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("shutdown did not interrupt the stream");
    assert!(matches!(next, Some(Err(_))));

    drop(body);
    assert_eq!(backend.active_transfers(), 0);
}

#[tokio::test]
async fn test_dropping_body_releases_upstream() {
    let (relay, backend) = relay_with(FaultPlan::default(), 16).await;

    let response = relay.relay(CLIP, None).await.unwrap();
    let mut body = response.into_body().into_data_stream();
    body.next().await.unwrap().unwrap();
    assert_eq!(backend.active_transfers(), 1);

    drop(body);
    assert_eq!(backend.active_transfers(), 0);
    assert_eq!(backend.opened_transfers(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let (relay, backend) = relay_with(FaultPlan::default(), 32).await;
    let relay = Arc::new(relay);

    let mut tasks = Vec::new();
    for start in (0..1000u64).step_by(100) {
        let relay = relay.clone();
        tasks.push(tokio::spawn(async move {
            let range = format!("bytes={}-{}", start, start + 99);
            let response = relay.relay(CLIP, Some(range.as_str())).await.unwrap();
            (start, drain(response).await.0)
        }));
    }

    for task in tasks {
        let (start, bytes) = task.await.unwrap();
        let start = start as usize;
        assert_eq!(bytes, payload(1000)[start..start + 100].to_vec());
    }
    assert_eq!(backend.opened_transfers(), 10);
    assert_eq!(backend.active_transfers(), 0);
}
