//! Static assets served from a plugin's views directory.

use serde::{Deserialize, Serialize};

/// Cache lifetime reported for assets the client must not cache.
pub const NO_CACHE_LIFETIME: i64 = -1;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("txt", "text/plain"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("xml", "application/xml"),
];

/// A view asset, or a not-modified marker for one.
///
/// A not-modified asset carries no data and a positive lifetime: the number
/// of seconds the client's copy is known to be current. A full asset
/// carries the file contents and [`NO_CACHE_LIFETIME`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAsset {
    data: Vec<u8>,
    mime_type: String,
    lifetime_seconds: i64,
}

impl CachedAsset {
    /// A not-modified marker valid for at least one second.
    #[must_use]
    pub fn not_modified(mime_type: impl Into<String>, lifetime_seconds: i64) -> Self {
        Self {
            data: Vec::new(),
            mime_type: mime_type.into(),
            lifetime_seconds: lifetime_seconds.max(1),
        }
    }

    /// A full asset.
    #[must_use]
    pub fn full(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            lifetime_seconds: NO_CACHE_LIFETIME,
        }
    }

    /// Reports whether the client's copy is still current.
    #[must_use]
    pub const fn is_not_modified(&self) -> bool {
        self.lifetime_seconds > 0
    }

    /// Asset contents; empty for not-modified markers.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// MIME type derived from the file extension.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Seconds the client may keep its copy, or [`NO_CACHE_LIFETIME`].
    #[must_use]
    pub const fn lifetime_seconds(&self) -> i64 {
        self.lifetime_seconds
    }
}

/// MIME type for `path`, chosen case-insensitively by extension.
#[must_use]
pub fn mime_type_for(path: &str) -> &'static str {
    let Some((_, extension)) = path.rsplit_once('.') else {
        return DEFAULT_MIME_TYPE;
    };
    if extension.contains('/') {
        return DEFAULT_MIME_TYPE;
    }
    MIME_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map_or(DEFAULT_MIME_TYPE, |&(_, mime)| mime)
}
