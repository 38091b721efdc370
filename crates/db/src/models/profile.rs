//! User profile model. Read-only from the orchestration core's
//! perspective; only the subscription columns matter here.

use serde::Serialize;
use sqlx::FromRow;
use vivid_core::types::{RecordId, Timestamp};

/// A row from the `profiles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    pub id: RecordId,
    pub email: Option<String>,
    pub subscription_tier: Option<String>,
    pub subscription_status: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Profile {
    /// Whether this profile's generations must be watermarked.
    pub fn is_free_tier(&self) -> bool {
        vivid_core::tier::is_free_tier(self.subscription_tier.as_deref())
    }
}
