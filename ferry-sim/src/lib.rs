//! Ferry Simulation - In-memory media backends for development and testing.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! The backends here serve media from memory instead of a remote service so
//! relay behaviour can be exercised deterministically. Faults such as
//! mid-transfer failures, over-delivery and stalled transfers can be injected
//! per media object.
//!
//! # Example
//!
//! ```rust
//! use ferry_core::{MediaBackend, MediaReference};
//! use ferry_sim::{FaultPlan, InMemoryBackend};
//!
//! # tokio_test::block_on(async {
//! let backend = InMemoryBackend::new();
//! let reference = MediaReference::new(1, 2);
//! backend
//!     .add_document(reference, "clip.mp4", "video/mp4", vec![0u8; 1024])
//!     .await;
//! backend
//!     .set_faults(reference, FaultPlan::default().fail_after(512))
//!     .await;
//!
//! assert_eq!(backend.object_count().await, 1);
//! # });
//! ```

pub mod demo;
pub mod memory_backend;

pub use demo::{DEMO_CONTAINER_ID, DEMO_ITEMS, DemoItem, demo_backend, demo_byte};
pub use memory_backend::{FaultPlan, InMemoryBackend};
