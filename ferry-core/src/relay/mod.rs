//! Range-aware media relay.
//!
//! A relay request walks through `LookupPending -> RangeComputed -> Streaming`
//! and ends in `Completed` or `Aborted`. Failures before `Streaming` become
//! clean HTTP errors; failures after the headers are committed can only
//! truncate the body.

pub mod body;
pub mod range;

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, MediaBackend};
use crate::config::RelayConfig;
use crate::media::{MediaInfo, MediaKind, MediaMetadata, MediaReference};
pub use range::{ByteRange, resolve};

/// Lifecycle of a single relay request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    LookupPending,
    RangeComputed,
    Streaming,
    Completed,
    Aborted,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::LookupPending => "lookup-pending",
            RelayState::RangeComputed => "range-computed",
            RelayState::Streaming => "streaming",
            RelayState::Completed => "completed",
            RelayState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Failures reported before any response byte is sent.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Message or media not found: {reference}")]
    NotFound { reference: MediaReference },

    #[error("{reason}")]
    BadRequest { reason: String },

    #[error("Error fetching message: {reason}")]
    Upstream { reason: String },

    #[error("Upstream transfer unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("Relay is shutting down")]
    ShuttingDown,
}

impl RelayError {
    /// HTTP status used to report this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::NotFound { .. } => StatusCode::NOT_FOUND,
            RelayError::BadRequest { .. } | RelayError::Upstream { .. } => StatusCode::BAD_REQUEST,
            RelayError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            RelayError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::NotFound { .. } => "not_found",
            RelayError::BadRequest { .. } => "bad_request",
            RelayError::Upstream { .. } => "upstream_error",
            RelayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            RelayError::ShuttingDown => "shutting_down",
        }
    }
}

/// Long-lived relay handle shared by all request handlers.
///
/// Holds no per-request state; each call owns its upstream transfer.
pub struct StreamRelay {
    backend: Arc<dyn MediaBackend>,
    chunk_size: usize,
    shutdown: CancellationToken,
}

impl StreamRelay {
    pub fn new(backend: Arc<dyn MediaBackend>, config: &RelayConfig) -> Self {
        Self {
            backend,
            chunk_size: config.chunk_size.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn backend(&self) -> &dyn MediaBackend {
        self.backend.as_ref()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Cancels in-flight streams and refuses new requests.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Relay shutdown requested, cancelling in-flight streams");
        }
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled by [`StreamRelay::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Looks up what is attached to `reference`.
    ///
    /// # Errors
    /// - `RelayError::ShuttingDown` - Shutdown was requested
    /// - `RelayError::NotFound` - The item or its media does not exist
    /// - `RelayError::Upstream` - The backend lookup failed
    pub async fn lookup(&self, reference: MediaReference) -> Result<MediaKind, RelayError> {
        if self.is_shutting_down() {
            return Err(RelayError::ShuttingDown);
        }

        tracing::debug!(reference = %reference, "Relay {}", RelayState::LookupPending);
        self.backend
            .fetch_media(reference)
            .await
            .map_err(|e| lookup_error(reference, e))
    }

    /// Describes the media attached to `reference`.
    ///
    /// # Errors
    /// Same as [`StreamRelay::lookup`].
    pub async fn info(&self, reference: MediaReference) -> Result<MediaInfo, RelayError> {
        let kind = self.lookup(reference).await?;
        Ok(MediaInfo::new(reference, kind.describe(reference)))
    }

    /// Serves `reference`, honouring an optional `Range` header value.
    ///
    /// The returned response streams its body lazily; headers are final.
    ///
    /// # Errors
    /// - `RelayError::NotFound` - The item or its media does not exist
    /// - `RelayError::BadRequest` - The media kind cannot be streamed
    /// - `RelayError::Upstream` - The backend lookup failed
    /// - `RelayError::UpstreamUnavailable` - The transfer could not be opened
    /// - `RelayError::ShuttingDown` - Shutdown was requested
    pub async fn relay(
        &self,
        reference: MediaReference,
        range_header: Option<&str>,
    ) -> Result<Response, RelayError> {
        let kind = self.lookup(reference).await?;
        let metadata = kind
            .streamable_metadata(reference)
            .ok_or_else(|| RelayError::BadRequest {
                reason: "Unsupported media type".to_string(),
            })?;

        if metadata.total_size == 0 {
            tracing::debug!(reference = %reference, "Serving zero-length media");
            let headers = response_headers(&metadata, 0, None)?;
            return Ok(build_response(StatusCode::OK, headers, Body::empty()));
        }

        let range = resolve(range_header, metadata.total_size);
        let content_length = range.length();
        let partial = range_header.is_some_and(|value| !value.is_empty());
        tracing::debug!(
            reference = %reference,
            start = range.start,
            end = range.end,
            total = metadata.total_size,
            partial,
            "Relay {}",
            RelayState::RangeComputed
        );

        let content_range = partial.then(|| range.content_range(metadata.total_size));
        let headers = response_headers(&metadata, content_length, content_range.as_deref())?;

        let upstream = self
            .backend
            .open_chunk_stream(reference, range.start, content_length, self.chunk_size)
            .await
            .map_err(|e| match e {
                BackendError::NotFound { .. } | BackendError::NoMedia { .. } => {
                    RelayError::NotFound { reference }
                }
                other => RelayError::UpstreamUnavailable {
                    reason: other.to_string(),
                },
            })?;

        tracing::debug!(reference = %reference, "Relay {}", RelayState::Streaming);
        let body = body::relay_body(reference, range, upstream, self.shutdown.clone());

        let status = if partial {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        Ok(build_response(status, headers, Body::from_stream(body)))
    }
}

fn lookup_error(reference: MediaReference, error: BackendError) -> RelayError {
    if error.is_missing() {
        RelayError::NotFound { reference }
    } else {
        tracing::warn!(reference = %reference, "Metadata lookup failed: {}", error);
        RelayError::Upstream {
            reason: error.to_string(),
        }
    }
}

/// Headers for a relayed object.
fn response_headers(
    metadata: &MediaMetadata,
    content_length: u64,
    content_range: Option<&str>,
) -> Result<HeaderMap, RelayError> {
    let mut headers = HeaderMap::new();

    let content_type = HeaderValue::from_str(&metadata.mime_type).map_err(|_| {
        RelayError::Upstream {
            reason: format!("Invalid media type {:?}", metadata.mime_type),
        }
    })?;
    let disposition = HeaderValue::from_bytes(metadata.content_disposition().as_bytes())
        .map_err(|_| RelayError::Upstream {
            reason: format!("Invalid file name {:?}", metadata.filename),
        })?;

    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    if let Some(content_range) = content_range {
        let value = HeaderValue::from_str(content_range).map_err(|_| RelayError::BadRequest {
            reason: "Invalid content range".to_string(),
        })?;
        headers.insert(header::CONTENT_RANGE, value);
    }

    Ok(headers)
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
