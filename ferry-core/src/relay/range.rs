//! Byte range resolution for HTTP `Range` request headers.
//!
//! Resolution is permissive: a header that cannot be understood yields the
//! full content instead of `416 Range Not Satisfiable`, and out-of-bounds
//! positions are clamped into the object. Media players rely on this when
//! probing with approximate offsets.

use std::sync::LazyLock;

use regex::Regex;

static RANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bytes=([0-9]+)-([0-9]*)").expect("range pattern compiles"));

/// Inclusive byte interval `[start, end]` inside a media object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the interval.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

/// Resolves an optional `Range` header against an object of `total_size` bytes.
///
/// Only the first `bytes=<start>-<end?>` occurrence is honoured. A missing end
/// means "to the last byte". The result always satisfies
/// `start <= end <= total_size - 1`; for `total_size == 0` the degenerate
/// `{0, 0}` is returned and callers must not serve it as a range.
///
/// # Panics
/// The first call compiles a constant pattern and panics only if that
/// pattern is invalid, which `test_range_pattern_compiles` rules out.
///
/// # Examples
/// ```
/// use ferry_core::relay::range::{ByteRange, resolve};
///
/// assert_eq!(resolve(Some("bytes=100-199"), 1000), ByteRange { start: 100, end: 199 });
/// assert_eq!(resolve(Some("bytes=5-"), 100), ByteRange { start: 5, end: 99 });
/// assert_eq!(resolve(Some("items=1-2"), 100), ByteRange { start: 0, end: 99 });
/// ```
pub fn resolve(range_header: Option<&str>, total_size: u64) -> ByteRange {
    if total_size == 0 {
        return ByteRange { start: 0, end: 0 };
    }

    let last = total_size - 1;
    let Some(captures) = range_header.and_then(|value| RANGE_PATTERN.captures(value)) else {
        return ByteRange {
            start: 0,
            end: last,
        };
    };

    let start = parse_saturating(&captures[1]);
    let end = match captures.get(2).map(|m| m.as_str()) {
        Some(digits) if !digits.is_empty() => parse_saturating(digits),
        _ => last,
    };

    let start = start.min(last);
    let end = end.clamp(start, last);

    ByteRange { start, end }
}

/// Digit runs longer than `u64` saturate so they clamp like any other
/// out-of-bounds position.
fn parse_saturating(digits: &str) -> u64 {
    digits.parse::<u64>().unwrap_or(u64::MAX)
}
