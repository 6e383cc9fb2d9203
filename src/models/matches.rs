//! Match edges and the projections returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One stored "goes with" edge.
///
/// Rows are stored canonically with `item_id < matches_with_id`; which side
/// is which carries no meaning for readers.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ItemMatch {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub item_id: Uuid,
    pub matches_with_id: Uuid,
}

impl ItemMatch {
    /// Order a pair the way it is stored.
    pub fn canonical(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b { (a, b) } else { (b, a) }
    }
}

/// The counterpart of a match, as seen from one endpoint.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct MatchingItem {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub description: Option<String>,
}
