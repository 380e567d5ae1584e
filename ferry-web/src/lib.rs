//! Ferry Web - HTTP surface of the media relay

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! Exposes the relay over HTTP: status and info endpoints returning JSON, the
//! ranged `/stream` endpoint and a small HTML player page.

pub mod error;
pub mod handlers;
pub mod server;
pub mod templates;

// Re-export main types
pub use error::ApiError;
pub use server::{AppState, build_router, run_server, serve};
