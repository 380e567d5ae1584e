//! In-memory media backend
//!
//! Serves media objects from memory with optional per-object fault plans, so
//! relay behaviour under upstream failures can be reproduced without a real
//! remote service.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::backend::{BackendError, ChunkStream, MediaBackend};
use ferry_core::media::{MediaKind, MediaReference};
use futures::{StreamExt, stream};
use tokio::sync::RwLock;

/// Faults injected into lookups and transfers of one media object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Transfers fail with a transport error after this many bytes
    pub fail_after: Option<u64>,
    /// Transfers stop making progress after this many bytes
    pub stall_after: Option<u64>,
    /// Extra bytes delivered past the requested limit
    pub over_deliver: u64,
    /// Metadata lookups fail with a transport error
    pub fail_lookup: bool,
    /// Opening a transfer fails with a transport error
    pub fail_open: bool,
}

impl FaultPlan {
    /// Fails transfers once `bytes` bytes were delivered.
    pub fn fail_after(mut self, bytes: u64) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    /// Stalls transfers once `bytes` bytes were delivered.
    pub fn stall_after(mut self, bytes: u64) -> Self {
        self.stall_after = Some(bytes);
        self
    }

    /// Delivers `bytes` more than each transfer asked for.
    pub fn over_deliver(mut self, bytes: u64) -> Self {
        self.over_deliver = bytes;
        self
    }

    /// Fails every metadata lookup.
    pub fn fail_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    /// Fails every attempt to open a transfer.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

struct StoredMedia {
    kind: MediaKind,
    data: Bytes,
    faults: FaultPlan,
}

/// Media backend holding every object in memory.
///
/// Cloning is cheap and clones share the same objects and counters.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    objects: Arc<RwLock<HashMap<MediaReference, StoredMedia>>>,
    opened_transfers: Arc<AtomicUsize>,
    active_transfers: Arc<AtomicUsize>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document with the given attributes.
    pub async fn add_document(
        &self,
        reference: MediaReference,
        filename: &str,
        mime_type: &str,
        data: impl Into<Bytes>,
    ) {
        let data = data.into();
        let kind = MediaKind::Document {
            filename: Some(filename.to_string()),
            mime_type: Some(mime_type.to_string()),
            size: data.len() as u64,
        };
        self.insert(reference, kind, data).await;
    }

    /// Stores a photo.
    pub async fn add_photo(&self, reference: MediaReference, data: impl Into<Bytes>) {
        let data = data.into();
        let kind = MediaKind::Photo {
            size: data.len() as u64,
        };
        self.insert(reference, kind, data).await;
    }

    /// Stores an object whose kind is given explicitly.
    ///
    /// The advertised size may disagree with `data`, which is how short
    /// upstream transfers are simulated.
    pub async fn insert(&self, reference: MediaReference, kind: MediaKind, data: impl Into<Bytes>) {
        let mut objects = self.objects.write().await;
        objects.insert(
            reference,
            StoredMedia {
                kind,
                data: data.into(),
                faults: FaultPlan::default(),
            },
        );
    }

    /// Replaces the fault plan of a stored object. Unknown references are
    /// ignored.
    pub async fn set_faults(&self, reference: MediaReference, faults: FaultPlan) {
        let mut objects = self.objects.write().await;
        if let Some(stored) = objects.get_mut(&reference) {
            stored.faults = faults;
        }
    }

    /// Removes an object from the backend.
    pub async fn remove(&self, reference: MediaReference) {
        let mut objects = self.objects.write().await;
        objects.remove(&reference);
    }

    /// Returns number of stored objects
    pub async fn object_count(&self) -> usize {
        let objects = self.objects.read().await;
        objects.len()
    }

    /// Number of transfers opened since creation.
    pub fn opened_transfers(&self) -> usize {
        self.opened_transfers.load(Ordering::SeqCst)
    }

    /// Number of transfers whose stream has not been dropped yet.
    pub fn active_transfers(&self) -> usize {
        self.active_transfers.load(Ordering::SeqCst)
    }
}

/// Decrements the active transfer counter when the transfer is dropped.
struct TransferGuard(Arc<AtomicUsize>);

impl TransferGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaBackend for InMemoryBackend {
    async fn fetch_media(&self, reference: MediaReference) -> Result<MediaKind, BackendError> {
        let objects = self.objects.read().await;
        let stored = objects
            .get(&reference)
            .ok_or(BackendError::NotFound { reference })?;

        if stored.faults.fail_lookup {
            return Err(BackendError::Transport {
                reason: format!("Injected lookup failure for {reference}"),
            });
        }

        Ok(stored.kind.clone())
    }

    async fn open_chunk_stream(
        &self,
        reference: MediaReference,
        offset: u64,
        limit: u64,
        chunk_size: usize,
    ) -> Result<ChunkStream, BackendError> {
        let (data, faults) = {
            let objects = self.objects.read().await;
            let stored = objects
                .get(&reference)
                .ok_or(BackendError::NotFound { reference })?;
            (stored.data.clone(), stored.faults.clone())
        };

        if faults.fail_open {
            return Err(BackendError::Transport {
                reason: format!("Injected open failure for {reference}"),
            });
        }

        let len = data.len() as u64;
        let start = offset.min(len);
        let mut end = offset.saturating_add(limit).saturating_add(faults.over_deliver).min(len);

        let cutoff = [faults.fail_after, faults.stall_after]
            .into_iter()
            .flatten()
            .min();
        if let Some(cutoff) = cutoff {
            end = end.min(start.saturating_add(cutoff));
        }

        // Bounds are clamped to the data length above, so they fit in usize.
        let window = data.slice(start as usize..end as usize);
        let chunk_size = chunk_size.max(1);
        let chunks: Vec<Result<Bytes, BackendError>> = (0..window.len())
            .step_by(chunk_size)
            .map(|at| Ok(window.slice(at..(at + chunk_size).min(window.len()))))
            .collect();

        let fails = faults.fail_after.is_some_and(|f| Some(f) == cutoff);
        let stalls = !fails && faults.stall_after.is_some();
        let tail: ChunkStream = if fails {
            Box::pin(stream::once(async move {
                Err::<Bytes, _>(BackendError::Transport {
                    reason: format!("Injected transfer failure for {reference}"),
                })
            }))
        } else if stalls {
            Box::pin(stream::pending::<Result<Bytes, BackendError>>())
        } else {
            Box::pin(stream::empty::<Result<Bytes, BackendError>>())
        };

        self.opened_transfers.fetch_add(1, Ordering::SeqCst);
        let guard = TransferGuard::new(self.active_transfers.clone());
        tracing::debug!(
            reference = %reference,
            offset,
            limit,
            chunks = chunks.len(),
            "Opened in-memory transfer"
        );

        Ok(Box::pin(stream::iter(chunks).chain(tail).map(move |item| {
            let _held = &guard;
            item
        })))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    async fn backend_with_clip(len: usize) -> (InMemoryBackend, MediaReference) {
        let backend = InMemoryBackend::new();
        let reference = MediaReference::new(-100, 1);
        backend
            .add_document(reference, "clip.mp4", "video/mp4", payload(len))
            .await;
        (backend, reference)
    }

    #[tokio::test]
    async fn test_add_lookup_remove() {
        let (backend, reference) = backend_with_clip(10).await;
        backend.add_photo(MediaReference::new(-100, 2), vec![1u8; 4]).await;
        assert_eq!(backend.object_count().await, 2);

        let kind = backend.fetch_media(reference).await.unwrap();
        assert_eq!(
            kind,
            MediaKind::Document {
                filename: Some("clip.mp4".to_string()),
                mime_type: Some("video/mp4".to_string()),
                size: 10,
            }
        );

        backend.remove(reference).await;
        assert_eq!(backend.object_count().await, 1);
        let result = backend.fetch_media(reference).await;
        assert!(matches!(result, Err(BackendError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_transfer_respects_offset_limit_and_chunk_size() {
        let (backend, reference) = backend_with_clip(1000).await;

        let chunks: Vec<Bytes> = backend
            .open_chunk_stream(reference, 100, 250, 64)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert!(chunks.iter().all(|c| c.len() <= 64));
        assert_eq!(chunks.concat(), payload(1000)[100..350].to_vec());
        assert_eq!(backend.opened_transfers(), 1);
        assert_eq!(backend.active_transfers(), 0);
    }

    #[tokio::test]
    async fn test_fail_after_yields_error() {
        let (backend, reference) = backend_with_clip(1000).await;
        backend
            .set_faults(reference, FaultPlan::default().fail_after(300))
            .await;

        let items: Vec<_> = backend
            .open_chunk_stream(reference, 0, 1000, 128)
            .await
            .unwrap()
            .collect()
            .await;

        let delivered: usize = items.iter().filter_map(|i| i.as_ref().ok()).map(|c| c.len()).sum();
        assert_eq!(delivered, 300);
        assert!(matches!(items.last(), Some(Err(BackendError::Transport { .. }))));
    }

    #[tokio::test]
    async fn test_over_delivery_exceeds_limit() {
        let (backend, reference) = backend_with_clip(1000).await;
        backend
            .set_faults(reference, FaultPlan::default().over_deliver(50))
            .await;

        let chunks: Vec<Bytes> = backend
            .open_chunk_stream(reference, 100, 100, 512)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.concat().len(), 150);
    }

    #[tokio::test]
    async fn test_stall_keeps_transfer_open_until_dropped() {
        let (backend, reference) = backend_with_clip(1000).await;
        backend
            .set_faults(reference, FaultPlan::default().stall_after(64))
            .await;

        let mut stream = backend
            .open_chunk_stream(reference, 0, 1000, 64)
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 64);
        assert_eq!(backend.active_transfers(), 1);

        let stalled = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(stalled.is_err());

        drop(stream);
        assert_eq!(backend.active_transfers(), 0);
    }

    #[tokio::test]
    async fn test_injected_lookup_and_open_failures() {
        let (backend, reference) = backend_with_clip(10).await;

        backend
            .set_faults(reference, FaultPlan::default().fail_lookup())
            .await;
        let lookup = backend.fetch_media(reference).await;
        assert!(matches!(lookup, Err(BackendError::Transport { .. })));

        backend
            .set_faults(reference, FaultPlan::default().fail_open())
            .await;
        let open = backend.open_chunk_stream(reference, 0, 10, 4).await;
        assert!(matches!(open, Err(BackendError::Transport { .. })));
        assert_eq!(backend.opened_transfers(), 0);
    }

    #[tokio::test]
    async fn test_advertised_size_larger_than_data_ends_short() {
        let backend = InMemoryBackend::new();
        let reference = MediaReference::new(1, 1);
        backend
            .insert(
                reference,
                MediaKind::Document {
                    filename: None,
                    mime_type: None,
                    size: 100,
                },
                vec![7u8; 40],
            )
            .await;

        let chunks: Vec<Bytes> = backend
            .open_chunk_stream(reference, 0, 100, 16)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat().len(), 40);
    }
}
