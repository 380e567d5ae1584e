//! HTTP request handlers organized by functionality

pub mod api;
pub mod player;
pub mod streaming;

// Re-export handler functions
pub use api::{ServerStatus, media_info, server_status};
pub use player::{PlayerQuery, player_page};
pub use streaming::stream_media;
