//! In-memory image files and the result of a successful upload.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An image file held in memory, as received from a client.
#[derive(Clone, Debug)]
pub struct ImageFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
    pub last_modified: DateTime<Utc>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
            last_modified: Utc::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// File name without its extension, with every non-alphanumeric character
    /// replaced by `_` and cut to `max_len` characters.
    pub fn sanitized_stem(&self, max_len: usize) -> String {
        let stem = match self.name.rfind('.') {
            Some(pos) if pos > 0 => &self.name[..pos],
            _ => self.name.as_str(),
        };
        stem.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(max_len)
            .collect()
    }
}

/// Stable reference to an uploaded image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadResult {
    /// Object-store name.
    pub path: String,
    /// Public URL for `path`.
    pub url: String,
}
