//! Generation entity model.
//!
//! One row per user-initiated AI generation, tracked from submission
//! through webhook reconciliation to a terminal state.

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use vivid_core::metadata::GenerationMetadata;
use vivid_core::types::{RecordId, Timestamp};

/// A row from the `ai_generations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Generation {
    pub id: RecordId,
    pub user_id: RecordId,
    pub tool_type: String,
    pub status: String,
    /// A single URL, or a JSON-encoded array of URLs for multi-image
    /// outputs. Populated only on success.
    pub output_file_url: Option<String>,
    pub thumbnail_url: Option<String>,
    /// User-facing failure message, set only when status is `failed`.
    pub error_message: Option<String>,
    pub metadata: Json<GenerationMetadata>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Lifecycle states of a generation.
///
/// `pending → processing → completed | failed`; the terminal states are
/// final and no webhook may revive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this state can never be left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Generation {
    /// Parsed lifecycle status of this row.
    pub fn lifecycle(&self) -> Option<GenerationStatus> {
        GenerationStatus::parse(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            GenerationStatus::Pending,
            GenerationStatus::Processing,
            GenerationStatus::Completed,
            GenerationStatus::Failed,
        ] {
            assert_eq!(GenerationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(GenerationStatus::parse("queued"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(GenerationStatus::Completed.is_terminal());
        assert!(GenerationStatus::Failed.is_terminal());
        assert!(!GenerationStatus::Processing.is_terminal());
        assert!(!GenerationStatus::Pending.is_terminal());
    }
}
