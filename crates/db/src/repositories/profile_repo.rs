//! Repository for the `profiles` table. Read-only.

use sqlx::PgPool;
use vivid_core::types::RecordId;

use crate::models::profile::Profile;

const PROFILE_COLUMNS: &str = "\
    id, email, subscription_tier, subscription_status, created_at, updated_at";

/// Read access to user profiles (subscription tier lookups).
pub struct ProfileRepo;

impl ProfileRepo {
    /// Find a profile by user ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: RecordId,
    ) -> Result<Option<Profile>, sqlx::Error> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        sqlx::query_as::<_, Profile>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
