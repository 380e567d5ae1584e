//! Ferry Core - Range-aware media relay
//!
//! This crate provides the building blocks for relaying remotely hosted media
//! over HTTP: byte range resolution, the streaming relay itself, the backend
//! abstraction it pulls bytes from, and configuration management.

pub mod backend;
pub mod config;
pub mod media;
pub mod relay;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use backend::{BackendError, ChunkStream, HttpOriginBackend, MediaBackend};
pub use config::FerryConfig;
pub use media::{MediaInfo, MediaKind, MediaMetadata, MediaReference, StreamLinks};
pub use relay::{ByteRange, RelayError, RelayState, StreamRelay};

/// Core errors that can bubble up from any Ferry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum FerryError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Tracing setup error: {0}")]
    Tracing(#[from] tracing_setup::TracingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FerryError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            FerryError::Backend(e) if e.is_missing() => "Requested media was not found".to_string(),
            FerryError::Backend(_) => "Media backend is unavailable".to_string(),
            FerryError::Relay(e) => e.to_string(),
            FerryError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            FerryError::Tracing(_) => "Logging could not be initialized".to_string(),
            FerryError::Io(_) => "I/O error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, FerryError::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;
