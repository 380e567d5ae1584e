//! Client-facing streaming workflows against a live relay server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ferry_core::config::FerryConfig;
use ferry_core::{MediaReference, StreamRelay};
use ferry_sim::{FaultPlan, InMemoryBackend};
use ferry_web::AppState;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const CLIP: MediaReference = MediaReference {
    container_id: 1,
    item_id: 2,
};
const CLIP_LEN: usize = 1000;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

struct TestServer {
    addr: SocketAddr,
    backend: InMemoryBackend,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(faults: FaultPlan) -> Self {
        Self::start_with(CLIP_LEN, faults).await
    }

    async fn start_with(len: usize, faults: FaultPlan) -> Self {
        let backend = InMemoryBackend::new();
        backend
            .add_document(CLIP, "clip.mp4", "video/mp4", payload(len))
            .await;
        backend.set_faults(CLIP, faults).await;

        let mut config = FerryConfig::for_testing();
        config.relay.chunk_size = 64;
        let relay = Arc::new(StreamRelay::new(Arc::new(backend.clone()), &config.relay));
        let state = AppState::new(relay, &config.server);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(ferry_web::serve(listener, state, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            backend,
            stop: Some(stop),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
    }
}

/// Reads a body until it ends or fails; returns the bytes and whether it
/// failed.
async fn read_body(response: reqwest::Response) -> (Vec<u8>, bool) {
    let mut stream = response.bytes_stream();
    let mut bytes = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(_) => return (bytes, true),
        }
    }
    (bytes, false)
}

#[tokio::test]
async fn test_range_request_over_http() {
    let server = TestServer::start(FaultPlan::default()).await;

    let response = reqwest::Client::new()
        .get(server.url("/stream/1/2"))
        .header(RANGE, "bytes=100-199")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 100-199/1000");
    assert_eq!(response.headers()[CONTENT_LENGTH], "100");

    let body = response.bytes().await.unwrap();
    assert_eq!(body.to_vec(), payload(CLIP_LEN)[100..200].to_vec());

    server.stop().await;
}

#[tokio::test]
async fn test_full_request_over_http() {
    let server = TestServer::start(FaultPlan::default()).await;

    let response = reqwest::get(server.url("/stream/1/2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(CONTENT_RANGE).is_none());
    assert_eq!(response.headers()[CONTENT_LENGTH], "1000");

    let body = response.bytes().await.unwrap();
    assert_eq!(body.to_vec(), payload(CLIP_LEN));

    server.stop().await;
}

#[tokio::test]
async fn test_mid_stream_failure_cuts_connection() {
    let server = TestServer::start(FaultPlan::default().fail_after(300)).await;

    let response = reqwest::get(server.url("/stream/1/2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_LENGTH], "1000");

    let (bytes, failed) = read_body(response).await;
    assert!(failed);
    assert!(bytes.len() < CLIP_LEN);

    // The server keeps serving after the aborted transfer.
    let status = reqwest::get(server.url("/")).await.unwrap().status();
    assert_eq!(status, StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_over_delivery_never_exceeds_content_length() {
    let server = TestServer::start(FaultPlan::default().over_deliver(500)).await;

    let response = reqwest::Client::new()
        .get(server.url("/stream/1/2"))
        .header(RANGE, "bytes=0-99")
        .send()
        .await
        .unwrap();
    let (bytes, failed) = read_body(response).await;

    assert!(!failed);
    assert_eq!(bytes, payload(CLIP_LEN)[..100].to_vec());

    server.stop().await;
}

#[tokio::test]
async fn test_client_disconnect_releases_upstream() {
    let server = TestServer::start_with(8 * 1024 * 1024, FaultPlan::default()).await;

    let response = reqwest::get(server.url("/stream/1/2")).await.unwrap();
    let mut stream = response.bytes_stream();
    stream.next().await.unwrap().unwrap();
    drop(stream);

    let released = tokio::time::timeout(Duration::from_secs(10), async {
        while server.backend.active_transfers() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(released.is_ok());
    assert_eq!(server.backend.opened_transfers(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_ends_in_flight_stream() {
    let server = TestServer::start(FaultPlan::default().stall_after(128)).await;

    let response = reqwest::get(server.url("/stream/1/2")).await.unwrap();
    let reader = tokio::spawn(read_body(response));

    // Let the stream reach the stall before shutting down.
    while server.backend.active_transfers() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    server.stop().await;

    let (bytes, failed) = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("stream did not end after shutdown")
        .unwrap();
    assert!(failed);
    assert!(bytes.len() <= 128);
}

#[tokio::test]
async fn test_info_and_status_over_http() {
    let server = TestServer::start(FaultPlan::default()).await;

    let info: serde_json::Value = reqwest::get(server.url("/info/1/2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["filename"], "clip.mp4");
    assert_eq!(info["size"], 1000);

    let missing = reqwest::get(server.url("/info/1/3")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["code"], "not_found");

    let status: serde_json::Value = reqwest::get(server.url("/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "running");
    assert_eq!(status["backend"], "in-memory");

    server.stop().await;
}
