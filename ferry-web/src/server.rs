//! HTTP server for the Ferry relay
//!
//! One long-lived [`StreamRelay`] is shared by every request through the
//! router state. Shutdown stops accepting connections and cancels in-flight
//! streams so graceful shutdown does not wait on slow clients.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use ferry_core::config::{FerryConfig, ServerConfig};
use ferry_core::{FerryError, MediaBackend, StreamRelay};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::handlers::{media_info, player_page, server_status, stream_media};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Relay serving media requests
    pub relay: Arc<StreamRelay>,
    /// Public base URL reported by the status endpoint
    pub base_url: String,
    /// Deployment label reported by the status endpoint
    pub environment: String,
}

impl AppState {
    /// Creates state for `relay` using the public addressing in `config`.
    pub fn new(relay: Arc<StreamRelay>, config: &ServerConfig) -> Self {
        Self {
            relay,
            base_url: config.base_url.clone(),
            environment: config.environment.clone(),
        }
    }
}

/// Builds the relay router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(server_status))
        .route("/info/{container_id}/{item_id}", get(media_info))
        .route("/stream/{container_id}/{item_id}", get(stream_media))
        .route("/player", get(player_page))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router on `listener` until `signal` resolves.
///
/// When `signal` resolves the relay is shut down, which ends in-flight
/// streams, and the server drains remaining connections.
///
/// # Errors
/// - `std::io::Error` - Accepting connections failed
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let relay = state.relay.clone();
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            relay.shutdown();
        })
        .await
}

/// Binds the configured address and runs the relay until SIGINT or SIGTERM.
///
/// # Errors
/// - `FerryError::Io` - Binding or serving failed
pub async fn run_server(
    config: &FerryConfig,
    backend: Arc<dyn MediaBackend>,
) -> Result<(), FerryError> {
    let backend_name = backend.name();
    let relay = Arc::new(StreamRelay::new(backend, &config.relay));
    let state = AppState::new(relay, &config.server);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        backend = backend_name,
        chunk_size = config.relay.chunk_size,
        environment = %config.server.environment,
        "Ferry relay listening on http://{}",
        local_addr
    );
    tracing::info!("Public base URL: {}", config.server.base_url);

    serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Ferry relay stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use ferry_core::{MediaKind, MediaReference};
    use ferry_sim::InMemoryBackend;
    use tower::ServiceExt;

    use super::*;

    async fn test_state() -> AppState {
        let backend = InMemoryBackend::new();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        backend
            .add_document(MediaReference::new(-100, 1), "clip.mp4", "video/mp4", data)
            .await;
        backend
            .add_photo(MediaReference::new(-100, 2), vec![9u8; 2048])
            .await;
        backend
            .insert(MediaReference::new(-100, 3), MediaKind::Unsupported, Vec::new())
            .await;

        let config = FerryConfig::for_testing();
        let relay = Arc::new(StreamRelay::new(Arc::new(backend), &config.relay));
        AppState::new(relay, &config.server)
    }

    async fn call(state: AppState, uri: &str, range: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        build_router(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let response = call(test_state().await, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["backend"], "in-memory");
        assert_eq!(body["connected"], true);
        assert_eq!(body["server_url"], "http://127.0.0.1");
        assert_eq!(body["environment"], "test");
    }

    #[tokio::test]
    async fn test_info_endpoint() {
        let response = call(test_state().await, "/info/-100/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["container_id"], -100);
        assert_eq!(body["item_id"], 1);
        assert_eq!(body["filename"], "clip.mp4");
        assert_eq!(body["mime_type"], "video/mp4");
        assert_eq!(body["size"], 1000);
        assert_eq!(body["size_mb"], 0.0);
    }

    #[tokio::test]
    async fn test_info_photo_fallbacks() {
        let body = body_json(call(test_state().await, "/info/-100/2", None).await).await;
        assert_eq!(body["filename"], "photo_2.jpg");
        assert_eq!(body["mime_type"], "image/jpeg");
    }

    #[tokio::test]
    async fn test_info_not_found_is_json_404() {
        let response = call(test_state().await, "/info/-100/99", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["code"], "not_found");
        assert_eq!(body["error"], "Message or media not found: -100/99");
    }

    #[tokio::test]
    async fn test_malformed_identifiers_are_400() {
        let response = call(test_state().await, "/stream/abc/1", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_stream_range_request() {
        let response = call(test_state().await, "/stream/-100/1", Some("bytes=100-199")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 100-199/1000"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let expected: Vec<u8> = (100..200u32).map(|i| i as u8).collect();
        assert_eq!(bytes.to_vec(), expected);
    }

    #[tokio::test]
    async fn test_stream_without_range() {
        let response = call(test_state().await, "/stream/-100/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.len(), 1000);
    }

    #[tokio::test]
    async fn test_stream_with_empty_range_value() {
        let response = call(test_state().await, "/stream/-100/1", Some("")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
    }

    #[tokio::test]
    async fn test_stream_unsupported_media_is_400() {
        let response = call(test_state().await, "/stream/-100/3", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Unsupported media type");
    }

    #[tokio::test]
    async fn test_stream_refused_while_shutting_down() {
        let state = test_state().await;
        state.relay.shutdown();

        let response = call(state.clone(), "/stream/-100/1", None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let status = body_json(call(state, "/", None).await).await;
        assert_eq!(status["status"], "shutting_down");
    }

    #[tokio::test]
    async fn test_player_page() {
        let response = call(
            test_state().await,
            "/player?stream=http%3A%2F%2F127.0.0.1%2Fstream%2F-100%2F1",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("src=\"http://127.0.0.1/stream/-100/1\""));
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://player.example")
            .body(Body::empty())
            .unwrap();
        let response = build_router(test_state().await)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
