//! Ranged media streaming endpoint

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use ferry_core::MediaReference;

use crate::error::ApiError;
use crate::server::AppState;

/// Streams an item's media, honouring an optional `Range` header.
///
/// Errors are only reported before the first body byte; later failures cut
/// the connection short.
///
/// # Errors
/// See [`ferry_core::StreamRelay::relay`] for the error kinds and
/// [`ferry_core::RelayError::status_code`] for their statuses.
pub async fn stream_media(
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Path((container_id, item_id)) = path?;
    let reference = MediaReference::new(container_id, item_id);

    // A non-UTF-8 value still counts as a (malformed) Range header.
    let range = headers
        .get(header::RANGE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    tracing::info!(
        reference = %reference,
        range = range.as_deref().unwrap_or("-"),
        "Stream request"
    );

    Ok(state.relay.relay(reference, range.as_deref()).await?)
}
