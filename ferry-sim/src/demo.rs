//! Built-in demo catalog served by `ferry serve --demo`.

use bytes::Bytes;
use ferry_core::media::{MediaKind, MediaReference};

use crate::memory_backend::InMemoryBackend;

/// Container holding every demo object.
pub const DEMO_CONTAINER_ID: i64 = -1000;

/// One entry of the demo catalog.
#[derive(Debug, Clone, Copy)]
pub struct DemoItem {
    /// Item id within [`DEMO_CONTAINER_ID`]
    pub item_id: i64,
    /// Human readable description for startup logs
    pub description: &'static str,
}

/// Objects registered by [`demo_backend`].
pub const DEMO_ITEMS: [DemoItem; 4] = [
    DemoItem {
        item_id: 1,
        description: "4 MiB video document (sample.mp4)",
    },
    DemoItem {
        item_id: 2,
        description: "256 KiB photo",
    },
    DemoItem {
        item_id: 3,
        description: "unsupported media",
    },
    DemoItem {
        item_id: 4,
        description: "zero-length document",
    },
];

/// Creates an in-memory backend populated with the demo catalog.
///
/// Content is a deterministic byte pattern, so any range can be verified
/// with [`demo_byte`].
pub async fn demo_backend() -> InMemoryBackend {
    let backend = InMemoryBackend::new();

    backend
        .add_document(
            MediaReference::new(DEMO_CONTAINER_ID, 1),
            "sample.mp4",
            "video/mp4",
            pattern(4 * 1024 * 1024),
        )
        .await;
    backend
        .add_photo(MediaReference::new(DEMO_CONTAINER_ID, 2), pattern(256 * 1024))
        .await;
    backend
        .insert(
            MediaReference::new(DEMO_CONTAINER_ID, 3),
            MediaKind::Unsupported,
            Bytes::new(),
        )
        .await;
    backend
        .add_document(
            MediaReference::new(DEMO_CONTAINER_ID, 4),
            "empty.bin",
            "application/octet-stream",
            Bytes::new(),
        )
        .await;

    tracing::info!(
        "Demo catalog ready: {} objects in container {}",
        DEMO_ITEMS.len(),
        DEMO_CONTAINER_ID
    );
    backend
}

/// Byte stored at `position` of every demo object.
pub fn demo_byte(position: u64) -> u8 {
    (position.wrapping_mul(31) % 251) as u8
}

fn pattern(len: usize) -> Bytes {
    (0..len as u64).map(demo_byte).collect()
}

#[cfg(test)]
mod tests {
    use ferry_core::backend::MediaBackend;
    use futures::StreamExt;
    use proptest::prelude::*;

    use super::*;

    #[tokio::test]
    async fn test_demo_catalog_contents() {
        let backend = demo_backend().await;
        assert_eq!(backend.object_count().await, DEMO_ITEMS.len());

        let video = backend
            .fetch_media(MediaReference::new(DEMO_CONTAINER_ID, 1))
            .await
            .unwrap();
        assert!(matches!(video, MediaKind::Document { size, .. } if size == 4 * 1024 * 1024));

        let unsupported = backend
            .fetch_media(MediaReference::new(DEMO_CONTAINER_ID, 3))
            .await
            .unwrap();
        assert_eq!(unsupported, MediaKind::Unsupported);
    }

    #[tokio::test]
    async fn test_demo_ranges_follow_pattern() {
        let backend = demo_backend().await;
        let bytes: Vec<Bytes> = backend
            .open_chunk_stream(MediaReference::new(DEMO_CONTAINER_ID, 1), 1_000_000, 4096, 1024)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let expected: Vec<u8> = (1_000_000..1_004_096).map(demo_byte).collect();
        assert_eq!(bytes.concat(), expected);
    }

    proptest! {
        #[test]
        fn test_pattern_matches_demo_byte(position in 0u64..65_536) {
            let data = pattern(65_536);
            prop_assert_eq!(data[position as usize], demo_byte(position));
        }
    }
}
