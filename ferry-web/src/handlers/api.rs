//! JSON endpoints describing the relay and its media

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::response::Json;
use ferry_core::{MediaInfo, MediaReference};
use serde::Serialize;

use crate::error::ApiError;
use crate::server::AppState;

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    /// `running`, or `shutting_down` once shutdown was requested
    pub status: &'static str,
    /// Name of the configured media backend
    pub backend: &'static str,
    /// Whether the backend reports itself as connected
    pub connected: bool,
    /// Public base URL used in generated links
    pub server_url: String,
    /// Deployment label
    pub environment: String,
}

/// Reports liveness and backend connectivity.
pub async fn server_status(State(state): State<AppState>) -> Json<ServerStatus> {
    let relay = &state.relay;
    let status = if relay.is_shutting_down() {
        "shutting_down"
    } else {
        "running"
    };

    Json(ServerStatus {
        status,
        backend: relay.backend().name(),
        connected: relay.backend().is_connected(),
        server_url: state.base_url.clone(),
        environment: state.environment.clone(),
    })
}

/// Describes the media attached to an item.
///
/// # Errors
/// - 400 - Malformed identifiers or a failed backend lookup
/// - 404 - The item or its media does not exist
/// - 503 - The relay is shutting down
pub async fn media_info(
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<MediaInfo>, ApiError> {
    let Path((container_id, item_id)) = path?;
    let info = state
        .relay
        .info(MediaReference::new(container_id, item_id))
        .await?;
    Ok(Json(info))
}
