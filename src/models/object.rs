//! Represents an image payload persisted by the object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single stored object (the payload lives on disk).
///
/// `name` is chosen by the ingestion pipeline and is unique across the store;
/// the store never overwrites an existing name.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Object name, also the last segment of the public URL.
    pub name: String,

    /// Content type (MIME type) recorded at upload.
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload, lowercase hex.
    pub etag: String,

    /// Timestamp when the object was stored.
    pub created_at: DateTime<Utc>,
}
