//! Media object identities and the metadata derived from a backend lookup.

use std::fmt;

use serde::Serialize;

/// Identifies a remote media object.
///
/// The container is the chat or channel holding the media and the item is the
/// message inside it. Container ids are frequently negative for channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaReference {
    pub container_id: i64,
    pub item_id: i64,
}

impl MediaReference {
    pub fn new(container_id: i64, item_id: i64) -> Self {
        Self {
            container_id,
            item_id,
        }
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_id, self.item_id)
    }
}

/// What a backend found attached to a referenced item.
///
/// Resolved once per lookup so later stages never re-inspect raw backend
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    /// A file-like attachment (video, audio, archive, ...).
    Document {
        filename: Option<String>,
        mime_type: Option<String>,
        size: u64,
    },
    /// A still image; `size` is the largest available rendition.
    Photo { size: u64 },
    /// Media the relay cannot serve as a byte stream.
    Unsupported,
}

impl MediaKind {
    /// Metadata for serving this media, or `None` when it cannot be streamed.
    pub fn streamable_metadata(&self, reference: MediaReference) -> Option<MediaMetadata> {
        match self {
            MediaKind::Unsupported => None,
            _ => Some(self.describe(reference)),
        }
    }

    /// Metadata for describing this media, falling back to generic values
    /// for unsupported kinds.
    pub fn describe(&self, reference: MediaReference) -> MediaMetadata {
        let item_id = reference.item_id;
        match self {
            MediaKind::Document {
                filename,
                mime_type,
                size,
            } => MediaMetadata {
                total_size: *size,
                mime_type: mime_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                filename: filename
                    .clone()
                    .unwrap_or_else(|| format!("file_{item_id}")),
            },
            MediaKind::Photo { size } => MediaMetadata {
                total_size: *size,
                mime_type: "image/jpeg".to_string(),
                filename: format!("photo_{item_id}.jpg"),
            },
            MediaKind::Unsupported => MediaMetadata {
                total_size: 0,
                mime_type: DEFAULT_MIME_TYPE.to_string(),
                filename: format!("media_{item_id}"),
            },
        }
    }
}

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Size, type and display name of a media object, valid for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    pub total_size: u64,
    pub mime_type: String,
    pub filename: String,
}

impl MediaMetadata {
    /// Value for the `Content-Disposition` response header.
    ///
    /// Quotes and control characters in the file name are replaced so the
    /// value always stays a single well-formed header line.
    pub fn content_disposition(&self) -> String {
        let filename: String = self
            .filename
            .chars()
            .map(|c| if c == '"' || c.is_control() { '_' } else { c })
            .collect();
        format!("inline; filename=\"{filename}\"")
    }
}

/// JSON document served by the info endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaInfo {
    pub container_id: i64,
    pub item_id: i64,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub size_mb: f64,
}

impl MediaInfo {
    pub fn new(reference: MediaReference, metadata: MediaMetadata) -> Self {
        Self {
            container_id: reference.container_id,
            item_id: reference.item_id,
            size_mb: size_in_megabytes(metadata.total_size),
            filename: metadata.filename,
            mime_type: metadata.mime_type,
            size: metadata.total_size,
        }
    }
}

/// Size in MiB rounded to two decimals.
pub fn size_in_megabytes(size: u64) -> f64 {
    (size as f64 / 1_048_576.0 * 100.0).round_ties_even() / 100.0
}

/// Public URLs under which a media object can be consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamLinks {
    pub stream_url: String,
    pub info_url: String,
    pub player_url: String,
}

impl StreamLinks {
    /// Builds links rooted at `base_url` (without trailing slash).
    pub fn new(base_url: &str, reference: MediaReference) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let stream_url = format!("{base_url}/stream/{reference}");
        let info_url = format!("{base_url}/info/{reference}");
        let player_url = format!("{base_url}/player?stream={stream_url}");

        Self {
            stream_url,
            info_url,
            player_url,
        }
    }
}
