//! Repository for the `ai_generations` table.
//!
//! The store provides no transactions spanning external calls, so the
//! mutation methods here carry their own guards: terminal states are
//! final, and the completion/failure updates succeed only while the row
//! is still `processing`. That conditional `WHERE status = 'processing'`
//! is the compare-and-swap that makes duplicate webhook deliveries
//! idempotent -- do not widen it.

use serde_json::Value;
use sqlx::PgPool;
use vivid_core::types::RecordId;

use crate::models::generation::Generation;

const GENERATION_COLUMNS: &str = "\
    id, user_id, tool_type, status, output_file_url, thumbnail_url, \
    error_message, metadata, created_at, updated_at, completed_at";

/// Data access for generation records.
pub struct GenerationRepo;

impl GenerationRepo {
    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Create a generation in its initial `pending` state.
    pub async fn create(
        pool: &PgPool,
        id: RecordId,
        user_id: RecordId,
        tool_type: &str,
    ) -> Result<Generation, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai_generations (id, user_id, tool_type, status) \
             VALUES ($1, $2, $3, 'pending') \
             RETURNING {GENERATION_COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .bind(user_id)
            .bind(tool_type)
            .fetch_one(pool)
            .await
    }

    /// Find a generation by ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: RecordId,
    ) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!("SELECT {GENERATION_COLUMNS} FROM ai_generations WHERE id = $1");
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the one in-flight generation correlated with a provider job
    /// handle.
    ///
    /// Filters on `status = 'processing'` so a webhook for an
    /// already-finalized record matches nothing.
    pub async fn find_processing_by_request_id(
        pool: &PgPool,
        fal_request_id: &str,
    ) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!(
            "SELECT {GENERATION_COLUMNS} FROM ai_generations \
             WHERE metadata->>'fal_request_id' = $1 AND status = 'processing'"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(fal_request_id)
            .fetch_optional(pool)
            .await
    }

    /// Look up the recorded provider model for a job handle, regardless
    /// of status. Used by the signature-bypass probe, which must key off
    /// what we recorded at submission, never off the inbound payload.
    pub async fn find_model_by_request_id(
        pool: &PgPool,
        fal_request_id: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<Option<String>> = sqlx::query_scalar(
            "SELECT metadata->>'model' FROM ai_generations \
             WHERE metadata->>'fal_request_id' = $1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(fal_request_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.flatten())
    }

    // -----------------------------------------------------------------------
    // Submission-side mutations
    // -----------------------------------------------------------------------

    /// Move a generation to `processing` on behalf of its owner.
    ///
    /// Refuses to revive a terminal record.
    pub async fn mark_processing(
        pool: &PgPool,
        id: RecordId,
        user_id: RecordId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_generations SET status = 'processing', updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND status NOT IN ('completed', 'failed')",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Shallow-merge a metadata patch into the row.
    ///
    /// Top-level keys in `patch` replace their counterparts; everything
    /// else is preserved. Used for correlation data after queue
    /// submission and for interim progress notes.
    pub async fn merge_metadata(
        pool: &PgPool,
        id: RecordId,
        patch: &Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE ai_generations \
             SET metadata = metadata || $2::jsonb, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reconciliation mutations (status-guarded)
    // -----------------------------------------------------------------------

    /// Finalize a successful generation.
    ///
    /// `metadata` is the full merged document (the caller read, merged,
    /// and serialized it). Returns `false` when the row was no longer
    /// `processing` -- a concurrent delivery won the race and this one
    /// must become a no-op.
    pub async fn complete_if_processing(
        pool: &PgPool,
        id: RecordId,
        output_file_url: &str,
        thumbnail_url: Option<&str>,
        metadata: &Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_generations SET \
                 status = 'completed', \
                 output_file_url = $2, \
                 thumbnail_url = $3, \
                 metadata = $4::jsonb, \
                 completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(output_file_url)
        .bind(thumbnail_url)
        .bind(metadata)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finalize a failed generation with a user-facing message and a
    /// diagnostic metadata patch. Same guard as completion.
    pub async fn fail_if_processing(
        pool: &PgPool,
        id: RecordId,
        error_message: &str,
        metadata_patch: &Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_generations SET \
                 status = 'failed', \
                 error_message = $2, \
                 metadata = metadata || $3::jsonb, \
                 completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(error_message)
        .bind(metadata_patch)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Catch-all failure for submission handlers: fail the record
    /// unless it already reached a terminal state.
    pub async fn fail_if_active(
        pool: &PgPool,
        id: RecordId,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_generations SET \
                 status = 'failed', \
                 error_message = $2, \
                 completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(id)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Post-processing mutations (any status; these land after completion)
    // -----------------------------------------------------------------------

    /// Record an extracted thumbnail from the FFmpeg collaborator.
    pub async fn set_thumbnail(
        pool: &PgPool,
        id: RecordId,
        thumbnail_url: &str,
        metadata_patch: &Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_generations SET \
                 thumbnail_url = $2, \
                 metadata = metadata || $3::jsonb, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(thumbnail_url)
        .bind(metadata_patch)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Swap the output URL for its watermarked version.
    pub async fn replace_output(
        pool: &PgPool,
        id: RecordId,
        output_file_url: &str,
        metadata_patch: &Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_generations SET \
                 output_file_url = $2, \
                 metadata = metadata || $3::jsonb, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(output_file_url)
        .bind(metadata_patch)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
