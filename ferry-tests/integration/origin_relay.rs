//! Relaying from a static file server through the HTTP origin backend.

use std::sync::Arc;

use axum::Router;
use axum::http::{StatusCode, header};
use ferry_core::config::{BackendConfig, RelayConfig};
use ferry_core::{HttpOriginBackend, MediaKind, MediaReference, RelayError, StreamRelay};
use tempfile::TempDir;
use tower_http::services::ServeDir;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 241) as u8).collect()
}

/// Serves `{dir}/{container}/{item}` files over HTTP with range support.
async fn spawn_file_origin(objects: &[(MediaReference, Vec<u8>)]) -> (String, TempDir) {
    let dir = TempDir::new().unwrap();
    for (reference, data) in objects {
        let container = dir.path().join(reference.container_id.to_string());
        std::fs::create_dir_all(&container).unwrap();
        std::fs::write(container.join(reference.item_id.to_string()), data).unwrap();
    }

    let app = Router::new().fallback_service(ServeDir::new(dir.path()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), dir)
}

fn origin_relay(origin: &str, chunk_size: usize) -> StreamRelay {
    let backend = HttpOriginBackend::new(origin, &BackendConfig::default()).unwrap();
    StreamRelay::new(Arc::new(backend), &RelayConfig { chunk_size })
}

#[tokio::test]
async fn test_origin_metadata_lookup() {
    let reference = MediaReference::new(-100, 1);
    let (origin, _dir) = spawn_file_origin(&[(reference, payload(5000))]).await;
    let relay = origin_relay(&origin, 1024);

    let kind = relay.lookup(reference).await.unwrap();
    assert!(matches!(kind, MediaKind::Document { size: 5000, .. }));

    let info = relay.info(reference).await.unwrap();
    assert_eq!(info.size, 5000);
    assert_eq!(info.filename, "file_1");
}

#[tokio::test]
async fn test_ranged_relay_from_origin() {
    let reference = MediaReference::new(-100, 1);
    let (origin, _dir) = spawn_file_origin(&[(reference, payload(200_000))]).await;
    let relay = origin_relay(&origin, 4096);

    let response = relay
        .relay(reference, Some("bytes=65536-131071"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        "bytes 65536-131071/200000"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.to_vec(), payload(200_000)[65_536..131_072].to_vec());
}

#[tokio::test]
async fn test_full_relay_from_origin() {
    let reference = MediaReference::new(3, 4);
    let (origin, _dir) = spawn_file_origin(&[(reference, payload(10_000))]).await;
    let relay = origin_relay(&origin, 1000);

    let response = relay.relay(reference, None).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.to_vec(), payload(10_000));
}

#[tokio::test]
async fn test_missing_origin_object_is_not_found() {
    let (origin, _dir) = spawn_file_origin(&[]).await;
    let relay = origin_relay(&origin, 1024);

    let error = relay
        .relay(MediaReference::new(1, 2), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(error, RelayError::NotFound { .. }));
}

#[tokio::test]
async fn test_unreachable_origin_is_lookup_error() {
    // Bind then drop a listener to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = origin_relay(&format!("http://{addr}"), 1024);
    let error = relay
        .relay(MediaReference::new(1, 2), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(error, RelayError::Upstream { .. }));
    assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
}
