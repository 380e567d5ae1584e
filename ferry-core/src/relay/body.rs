//! Response body that relays one upstream transfer to the client.
//!
//! The body is pulled by the HTTP transport, so the next upstream buffer is
//! only requested once the previous one was handed over. A slow client
//! therefore throttles backend reads instead of growing a buffer.

use std::io;

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use tokio_util::sync::CancellationToken;

use super::RelayState;
use super::range::ByteRange;
use crate::backend::ChunkStream;
use crate::media::MediaReference;

/// Per-request transfer state owned by the response body.
///
/// Holding the upstream stream here ties its lifetime to the body: when the
/// transport drops the body (completion, disconnect, error), the upstream
/// transfer is closed with it.
struct RelayTransfer {
    reference: MediaReference,
    range: ByteRange,
    upstream: Option<ChunkStream>,
    remaining: u64,
    emitted: u64,
    state: RelayState,
    shutdown: CancellationToken,
}

impl RelayTransfer {
    fn complete(&mut self) {
        self.upstream = None;
        self.state = RelayState::Completed;
        tracing::debug!(
            reference = %self.reference,
            bytes = self.emitted,
            "Relay {} -> {}",
            RelayState::Streaming,
            self.state
        );
    }

    fn abort(&mut self, reason: &str) {
        self.upstream = None;
        self.state = RelayState::Aborted;
        tracing::warn!(
            reference = %self.reference,
            start = self.range.start,
            end = self.range.end,
            emitted = self.emitted,
            missing = self.remaining,
            "Relay aborted mid-stream: {}",
            reason
        );
    }
}

impl Drop for RelayTransfer {
    fn drop(&mut self) {
        if self.state == RelayState::Streaming {
            tracing::debug!(
                reference = %self.reference,
                emitted = self.emitted,
                missing = self.remaining,
                "Client went away, closing upstream transfer"
            );
        }
    }
}

/// Builds the body stream for `range`, emitting exactly `range.length()`
/// bytes unless the upstream fails or ends early.
///
/// Buffers larger than the remaining length are truncated. An upstream error
/// or shutdown yields an `io::Error`, which makes the transport drop the
/// connection without a clean end of body.
pub(crate) fn relay_body(
    reference: MediaReference,
    range: ByteRange,
    upstream: ChunkStream,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let transfer = RelayTransfer {
        reference,
        range,
        upstream: Some(upstream),
        remaining: range.length(),
        emitted: 0,
        state: RelayState::Streaming,
        shutdown,
    };

    stream::unfold(transfer, |mut transfer| async move {
        let upstream = transfer.upstream.as_mut()?;

        let next = tokio::select! {
            biased;
            _ = transfer.shutdown.cancelled() => {
                transfer.abort("relay shutting down");
                let error = io::Error::new(io::ErrorKind::Interrupted, "relay shutting down");
                return Some((Err(error), transfer));
            }
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(mut chunk)) if !chunk.is_empty() => {
                if chunk.len() as u64 > transfer.remaining {
                    // remaining < chunk.len() here, so it fits in usize
                    chunk.truncate(transfer.remaining as usize);
                }
                let len = chunk.len() as u64;
                transfer.remaining -= len;
                transfer.emitted += len;
                if transfer.remaining == 0 {
                    transfer.complete();
                }
                Some((Ok(chunk), transfer))
            }
            Some(Ok(_)) | None => {
                if transfer.remaining > 0 {
                    transfer.abort("upstream ended before the requested range");
                } else {
                    transfer.complete();
                }
                None
            }
            Some(Err(e)) => {
                transfer.abort(&e.to_string());
                Some((Err(io::Error::other(e)), transfer))
            }
        }
    })
}
