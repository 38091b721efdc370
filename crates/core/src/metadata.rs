//! Structured generation metadata.
//!
//! The generation row carries a JSONB `metadata` column that
//! accumulates correlation ids, diagnostics, and post-processing
//! sub-records over the lifetime of a request. It is modeled here as a
//! struct of well-known optional sub-records plus a flattened
//! passthrough map, so that merges are field-level and an update can
//! never drop history it did not explicitly touch. Unknown keys written
//! by older deployments survive a round-trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Sub-records
// ---------------------------------------------------------------------------

/// Diagnostics captured when a queue submission is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionError {
    pub status_code: Option<i64>,
    pub error_type: String,
    pub technical_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_url: Option<String>,
    pub occurred_at: Timestamp,
}

/// Analysis of a failure reported through the webhook channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub error_code: Option<i64>,
    pub error_type: String,
    pub content_violation: bool,
    pub server_error: bool,
    pub bad_request: bool,
    pub raw_error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_status: Option<String>,
    /// Full envelope as received, kept for later debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_envelope: Option<Value>,
    pub analyzed_at: Timestamp,
}

/// Where the output media ended up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Ephemeral URL the provider reported. Retained for audit even
    /// after materialization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_provider_url: Option<String>,
    /// Durable storage URL, when materialization succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_url: Option<String>,
    /// All URLs for multi-image outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_via_webhook: Option<bool>,
}

/// Record of the post-processing dispatch decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegDispatch {
    pub initiated: bool,
    pub task_count: u32,
    pub watermark_required: bool,
    pub user_tier: String,
    pub media_type: String,
    pub dispatched_at: Timestamp,
}

/// Outcome of one FFmpeg collaborator task, merged in by its callback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Timestamped note for interim webhook statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNote {
    pub last_status: String,
    pub updated_at: Timestamp,
}

/// Marker for the legacy bounded-poll submission path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRecord {
    pub mode: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
}

// ---------------------------------------------------------------------------
// GenerationMetadata
// ---------------------------------------------------------------------------

/// The structured metadata bag on a generation row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Provider job handle; the webhook correlation key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fal_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_request_id: Option<String>,
    /// Provider model path, e.g. `fal-ai/wan-pro/image-to-video`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_submitted_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<SubmissionError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_analysis: Option<ErrorAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<FfmpegDispatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_processing: Option<ProcessingRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_processing: Option<ProcessingRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_processing: Option<ProcessingRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollRecord>,
    /// Keys this version of the schema does not model. Preserved
    /// verbatim across merges and round-trips.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl GenerationMetadata {
    /// Merge `patch` into `self`, field by field.
    ///
    /// A `None` field in the patch leaves the existing value untouched;
    /// a `Some` field replaces it wholesale at sub-record granularity.
    /// Unknown keys from both sides are kept, patch winning on key
    /// collision.
    pub fn merge(&mut self, patch: GenerationMetadata) {
        macro_rules! take {
            ($field:ident) => {
                if patch.$field.is_some() {
                    self.$field = patch.$field;
                }
            };
        }
        take!(fal_request_id);
        take!(gateway_request_id);
        take!(model);
        take!(tool_type);
        take!(output_format);
        take!(webhook_url);
        take!(queue_submitted_at);
        take!(seed);
        take!(submission_error);
        take!(error_analysis);
        take!(media);
        take!(ffmpeg);
        take!(thumbnail_processing);
        take!(watermark_processing);
        take!(ffmpeg_processing);
        take!(progress);
        take!(poll);
        for (key, value) in patch.extra {
            self.extra.insert(key, value);
        }
    }

    /// Whether any thumbnail is already known for this generation.
    pub fn has_thumbnail(&self) -> bool {
        let media_thumb = self.media.as_ref().is_some_and(|m| {
            m.original_thumbnail_url.is_some() || m.stored_thumbnail_url.is_some()
        });
        let processed_thumb = self
            .thumbnail_processing
            .as_ref()
            .is_some_and(|p| p.result_url.is_some());
        media_thumb || processed_thumb
    }

    /// Serialize to a JSON object for a JSONB merge patch.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn merge_keeps_existing_when_patch_is_none() {
        let mut meta = GenerationMetadata {
            fal_request_id: Some("req-1".into()),
            model: Some("fal-ai/wan-pro/image-to-video".into()),
            ..Default::default()
        };
        meta.merge(GenerationMetadata {
            seed: Some(42),
            ..Default::default()
        });
        assert_eq!(meta.fal_request_id.as_deref(), Some("req-1"));
        assert_eq!(meta.model.as_deref(), Some("fal-ai/wan-pro/image-to-video"));
        assert_eq!(meta.seed, Some(42));
    }

    #[test]
    fn merge_replaces_populated_fields() {
        let mut meta = GenerationMetadata {
            progress: Some(ProgressNote {
                last_status: "IN_QUEUE".into(),
                updated_at: Utc::now(),
            }),
            ..Default::default()
        };
        meta.merge(GenerationMetadata {
            progress: Some(ProgressNote {
                last_status: "IN_PROGRESS".into(),
                updated_at: Utc::now(),
            }),
            ..Default::default()
        });
        assert_eq!(meta.progress.unwrap().last_status, "IN_PROGRESS");
    }

    #[test]
    fn merge_preserves_unknown_keys() {
        let mut meta: GenerationMetadata = serde_json::from_value(serde_json::json!({
            "fal_request_id": "req-1",
            "legacy_flag": true,
        }))
        .unwrap();
        meta.merge(GenerationMetadata {
            seed: Some(7),
            ..Default::default()
        });
        assert_eq!(meta.extra.get("legacy_flag"), Some(&Value::Bool(true)));

        let round_trip = meta.to_value();
        assert_eq!(round_trip["legacy_flag"], Value::Bool(true));
        assert_eq!(round_trip["fal_request_id"], "req-1");
    }

    #[test]
    fn serialization_skips_empty_fields() {
        let value = GenerationMetadata {
            fal_request_id: Some("req-1".into()),
            ..Default::default()
        }
        .to_value();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("fal_request_id"));
    }

    #[test]
    fn has_thumbnail_checks_media_and_processing() {
        let mut meta = GenerationMetadata::default();
        assert!(!meta.has_thumbnail());

        meta.media = Some(MediaRecord {
            original_thumbnail_url: Some("https://p/t.jpg".into()),
            ..Default::default()
        });
        assert!(meta.has_thumbnail());

        let mut meta = GenerationMetadata {
            thumbnail_processing: Some(ProcessingRecord {
                status: "completed".into(),
                result_url: Some("https://s/t.jpg".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(meta.has_thumbnail());
        meta.thumbnail_processing.as_mut().unwrap().result_url = None;
        assert!(!meta.has_thumbnail());
    }
}
