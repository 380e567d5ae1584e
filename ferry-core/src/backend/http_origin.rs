//! Backend that pulls media from a plain HTTP origin server.
//!
//! Objects live at `{origin}/{container_id}/{item_id}`. Metadata comes from a
//! `HEAD` request and bytes from ranged `GET` requests, so any static file
//! server or object store gateway can sit behind the relay.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, RANGE};

use super::{BackendError, ChunkStream, MediaBackend, rechunk};
use crate::config::BackendConfig;
use crate::media::{MediaKind, MediaReference};

/// Media backend over an HTTP origin with byte-range support.
pub struct HttpOriginBackend {
    origin: String,
    client: reqwest::Client,
}

impl HttpOriginBackend {
    /// Creates a backend rooted at `origin`.
    ///
    /// # Errors
    /// - `BackendError::Decode` - `origin` is not an absolute http(s) URL
    /// - `BackendError::Transport` - The HTTP client could not be constructed
    pub fn new(origin: impl Into<String>, config: &BackendConfig) -> Result<Self, BackendError> {
        let origin = origin.into();
        let parsed = url::Url::parse(&origin).map_err(|e| BackendError::Decode {
            reason: format!("Invalid origin URL {origin:?}: {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::Decode {
                reason: format!("Unsupported origin scheme {:?}", parsed.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| BackendError::Transport {
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            origin: origin.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn object_url(&self, reference: MediaReference) -> String {
        format!(
            "{}/{}/{}",
            self.origin, reference.container_id, reference.item_id
        )
    }

    fn transport_error(&self, reference: MediaReference, error: reqwest::Error) -> BackendError {
        tracing::warn!("Request for {} to {} failed: {}", reference, self.origin, error);
        BackendError::Transport {
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl MediaBackend for HttpOriginBackend {
    async fn fetch_media(&self, reference: MediaReference) -> Result<MediaKind, BackendError> {
        let url = self.object_url(reference);
        tracing::debug!("Fetching metadata from {}", url);

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(reference, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound { reference });
        }
        if !status.is_success() {
            return Err(BackendError::Transport {
                reason: format!("Origin returned {status} for {url}"),
            });
        }

        media_kind_from_headers(reference, response.headers())
    }

    async fn open_chunk_stream(
        &self,
        reference: MediaReference,
        offset: u64,
        limit: u64,
        chunk_size: usize,
    ) -> Result<ChunkStream, BackendError> {
        if limit == 0 {
            return Ok(Box::pin(futures::stream::empty::<Result<Bytes, BackendError>>()));
        }

        let url = self.object_url(reference);
        let range = format!("bytes={}-{}", offset, offset + limit - 1);
        tracing::debug!("Opening transfer {} {}", url, range);

        let response = self
            .client
            .get(&url)
            .header(RANGE, range)
            .send()
            .await
            .map_err(|e| self.transport_error(reference, e))?;

        // An origin that ignores Range answers 200 with the whole object.
        let skip = match response.status() {
            StatusCode::PARTIAL_CONTENT => 0,
            StatusCode::OK => offset,
            StatusCode::NOT_FOUND => return Err(BackendError::NotFound { reference }),
            status => {
                return Err(BackendError::Transport {
                    reason: format!("Origin returned {status} for ranged read of {url}"),
                });
            }
        };

        let body = response.bytes_stream().map_err(|e| BackendError::Transport {
            reason: e.to_string(),
        });

        Ok(rechunk(body, skip, limit, chunk_size))
    }

    fn name(&self) -> &'static str {
        "http-origin"
    }
}

/// Derives the media kind from origin response headers.
fn media_kind_from_headers(
    reference: MediaReference,
    headers: &HeaderMap,
) -> Result<MediaKind, BackendError> {
    let Some(length) = headers.get(CONTENT_LENGTH) else {
        return Err(BackendError::NoMedia { reference });
    };
    let size = length
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .ok_or_else(|| BackendError::Decode {
            reason: format!("Invalid Content-Length for {reference}"),
        })?;

    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    if mime_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with("image/"))
    {
        return Ok(MediaKind::Photo { size });
    }

    let filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(disposition_filename);

    Ok(MediaKind::Document {
        filename,
        mime_type,
        size,
    })
}

/// Extracts `filename` from a `Content-Disposition` value.
fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|part| {
        let (key, name) = part.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = name.trim().trim_matches('"');
        let name = urlencoding::decode(name).map(|n| n.into_owned()).ok()?;
        (!name.is_empty()).then_some(name)
    })
}
