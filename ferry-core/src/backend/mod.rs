//! Remote media backends consumed by the relay.
//!
//! A backend answers two questions: what is attached to a referenced item,
//! and what are its bytes from a given offset on. Everything else about the
//! remote service (sessions, authentication, message lookup) stays behind
//! this boundary.

pub mod http_origin;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use futures::{Stream, StreamExt, stream};
pub use http_origin::HttpOriginBackend;

use crate::media::{MediaKind, MediaReference};

/// Errors reported by a media backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The referenced item does not exist
    #[error("Media object {reference} not found")]
    NotFound {
        /// Reference that was looked up
        reference: MediaReference,
    },

    /// The referenced item exists but carries no media
    #[error("Media object {reference} has no media attached")]
    NoMedia {
        /// Reference that was looked up
        reference: MediaReference,
    },

    /// Network or protocol failure talking to the backend
    #[error("Backend transport error: {reason}")]
    Transport {
        /// Description of the failure
        reason: String,
    },

    /// The backend answered with data that could not be interpreted
    #[error("Backend decode error: {reason}")]
    Decode {
        /// Description of the failure
        reason: String,
    },
}

impl BackendError {
    /// True when the object or its media is absent rather than unreachable.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            BackendError::NotFound { .. } | BackendError::NoMedia { .. }
        )
    }
}

/// Lazy, finite sequence of byte buffers for one upstream transfer.
///
/// Dropping the stream closes the transfer.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// Reshapes an upstream byte stream into a transfer of `limit` bytes.
///
/// The first `skip` bytes are discarded, buffers are split to at most
/// `chunk_size` bytes, and the stream ends once `limit` bytes were yielded or
/// after the first error.
pub fn rechunk<S>(inner: S, skip: u64, limit: u64, chunk_size: usize) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, BackendError>> + Send + 'static,
{
    struct Rechunk {
        inner: Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>,
        pending: Bytes,
        skip: u64,
        remaining: u64,
        chunk_size: usize,
    }

    let state = Rechunk {
        inner: Box::pin(inner),
        pending: Bytes::new(),
        skip,
        remaining: limit,
        chunk_size: chunk_size.max(1),
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.remaining == 0 {
                return None;
            }

            if !state.pending.is_empty() {
                let remaining = usize::try_from(state.remaining).unwrap_or(usize::MAX);
                let take = state.pending.len().min(state.chunk_size).min(remaining);
                let chunk = state.pending.split_to(take);
                state.remaining -= take as u64;
                return Some((Ok(chunk), state));
            }

            match state.inner.next().await? {
                Ok(mut bytes) => {
                    if state.skip > 0 {
                        let skipped = usize::try_from(state.skip)
                            .unwrap_or(usize::MAX)
                            .min(bytes.len());
                        bytes.advance(skipped);
                        state.skip -= skipped as u64;
                    }
                    state.pending = bytes;
                }
                Err(e) => {
                    state.remaining = 0;
                    return Some((Err(e), state));
                }
            }
        }
    }))
}

/// Source of media metadata and media bytes.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Looks up what is attached to `reference`.
    ///
    /// # Errors
    /// - `BackendError::NotFound` - The item does not exist
    /// - `BackendError::NoMedia` - The item carries no media
    /// - `BackendError::Transport` - The backend could not be reached
    async fn fetch_media(&self, reference: MediaReference) -> Result<MediaKind, BackendError>;

    /// Opens a transfer of `limit` bytes starting at `offset`.
    ///
    /// Buffers are yielded in order and are at most `chunk_size` bytes long,
    /// although callers must tolerate larger ones. The stream ends after
    /// `limit` bytes or earlier if the backend runs out of data.
    ///
    /// # Errors
    /// - `BackendError::NotFound` - The item does not exist
    /// - `BackendError::Transport` - The transfer could not be started
    async fn open_chunk_stream(
        &self,
        reference: MediaReference,
        offset: u64,
        limit: u64,
        chunk_size: usize,
    ) -> Result<ChunkStream, BackendError>;

    /// Short identifier of the backend implementation.
    fn name(&self) -> &'static str;

    /// Whether the backend currently believes it can serve requests.
    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(
        chunks: Vec<Result<&'static [u8], BackendError>>,
    ) -> impl Stream<Item = Result<Bytes, BackendError>> + Send + 'static {
        stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(Bytes::from_static))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_rechunk_splits_large_buffers() {
        let stream = rechunk(upstream(vec![Ok(&b"abcdefghij"[..])]), 0, 10, 4);
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks, vec![&b"abcd"[..], &b"efgh"[..], &b"ij"[..]]);
    }

    #[tokio::test]
    async fn test_rechunk_skips_and_limits() {
        let stream = rechunk(upstream(vec![Ok(&b"0123"[..]), Ok(&b"4567"[..]), Ok(&b"89"[..])]), 5, 3, 16);
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks.concat(), b"567".to_vec());
    }

    #[tokio::test]
    async fn test_rechunk_ends_after_error() {
        let stream = rechunk(
            upstream(vec![
                Ok(&b"ab"[..]),
                Err(BackendError::Transport {
                    reason: "reset".to_string(),
                }),
                Ok(&b"cd"[..]),
            ]),
            0,
            10,
            16,
        );
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(BackendError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_rechunk_ends_with_upstream() {
        let stream = rechunk(upstream(vec![Ok(&b"abc"[..])]), 0, 100, 16);
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks.concat(), b"abc".to_vec());
    }

    #[test]
    fn test_missing_errors() {
        let reference = MediaReference::new(1, 2);
        assert!(BackendError::NotFound { reference }.is_missing());
        assert!(BackendError::NoMedia { reference }.is_missing());
        assert!(
            !BackendError::Transport {
                reason: "timeout".to_string()
            }
            .is_missing()
        );
    }
}
