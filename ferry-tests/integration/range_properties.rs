//! Properties of ranged responses over arbitrary objects and Range headers.

use std::sync::Arc;

use axum::http::{StatusCode, header};
use ferry_core::config::RelayConfig;
use ferry_core::{MediaReference, StreamRelay};
use ferry_sim::InMemoryBackend;
use proptest::prelude::*;

const OBJECT: MediaReference = MediaReference {
    container_id: 7,
    item_id: 11,
};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(7) % 256) as u8).collect()
}

struct Observed {
    status: StatusCode,
    content_length: u64,
    content_range: Option<String>,
    body: Vec<u8>,
}

fn observe(total: usize, chunk_size: usize, range: Option<String>) -> Observed {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let backend = InMemoryBackend::new();
        backend
            .add_document(OBJECT, "object.bin", "application/octet-stream", payload(total))
            .await;
        let relay = StreamRelay::new(Arc::new(backend), &RelayConfig { chunk_size });

        let response = relay.relay(OBJECT, range.as_deref()).await.unwrap();
        let status = response.status();
        let content_length = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let content_range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();

        Observed {
            status,
            content_length,
            content_range,
            body,
        }
    })
}

#[test]
fn test_open_ended_range_on_zero_length_object() {
    let observed = observe(0, 64, Some("bytes=0-".to_string()));

    assert_eq!(observed.status, StatusCode::OK);
    assert_eq!(observed.content_length, 0);
    assert!(observed.content_range.is_none());
    assert!(observed.body.is_empty());
}

#[test]
fn test_range_past_end_is_clamped() {
    let observed = observe(1000, 64, Some("bytes=5000-9000".to_string()));

    assert_eq!(observed.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(observed.content_range.as_deref(), Some("bytes 999-999/1000"));
    assert_eq!(observed.body, vec![payload(1000)[999]]);
}

#[test]
fn test_single_byte_object() {
    let observed = observe(1, 64, Some("bytes=0-0".to_string()));

    assert_eq!(observed.content_range.as_deref(), Some("bytes 0-0/1"));
    assert_eq!(observed.body.len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn body_matches_declared_length_and_content(
        total in 1usize..4096,
        chunk_size in 1usize..1024,
        start in 0u64..5000,
        span in proptest::option::of(0u64..5000),
    ) {
        let range = match span {
            Some(span) => format!("bytes={}-{}", start, start + span),
            None => format!("bytes={start}-"),
        };
        let observed = observe(total, chunk_size, Some(range));

        let last = total as u64 - 1;
        let expected_start = start.min(last);
        let expected_end = span.map_or(last, |s| (start + s).clamp(expected_start, last));

        prop_assert_eq!(observed.status, StatusCode::PARTIAL_CONTENT);
        prop_assert_eq!(observed.content_length, expected_end - expected_start + 1);
        prop_assert_eq!(observed.body.len() as u64, observed.content_length);
        prop_assert_eq!(
            observed.content_range,
            Some(format!("bytes {expected_start}-{expected_end}/{total}"))
        );
        prop_assert_eq!(
            &observed.body[..],
            &payload(total)[expected_start as usize..=expected_end as usize]
        );
    }

    #[test]
    fn requests_without_range_return_everything(total in 1usize..4096, chunk_size in 1usize..512) {
        let observed = observe(total, chunk_size, None);

        prop_assert_eq!(observed.status, StatusCode::OK);
        prop_assert_eq!(observed.content_length, total as u64);
        prop_assert!(observed.content_range.is_none());
        prop_assert_eq!(observed.body, payload(total));
    }
}
