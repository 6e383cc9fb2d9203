//! Represents a cataloged clothing item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// A clothing item in the wardrobe.
///
/// `image_path` and `image_url` always point at the same stored object: the
/// URL is derived from the path by the object store when the image is uploaded.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct ClothingItem {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Never earlier than `created_at`.
    pub updated_at: DateTime<Utc>,
    /// Display name, trimmed, 1..=100 chars.
    pub name: String,
    pub description: Option<String>,
    /// Object-store name of the image.
    pub image_path: String,
    /// Publicly fetchable URL for `image_path`.
    pub image_url: String,
}

/// Fields supplied when creating an item.
#[derive(Deserialize, Clone, Debug)]
pub struct ClothingItemInput {
    pub name: String,
    pub description: Option<String>,
    pub image_url: String,
    pub image_path: String,
}

/// Partial update; absent fields are left untouched.
///
/// `description: Some("")` clears the description. There is no `image_url`:
/// it always follows `image_path`.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ClothingItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
}
