//! Post-processing dispatch to the FFmpeg collaborator service.
//!
//! After a video generation completes, up to two tasks are fired at the
//! collaborator: thumbnail extraction (when the provider supplied none)
//! and watermark overlay (free tier only). Tasks are dispatched
//! concurrently; each outcome is observed and logged, and no failure
//! ever propagates to the webhook response or the completed record.
//! Results arrive later through the collaborator's own callback, which
//! is handled in `handlers::ffmpeg_webhook`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::task::JoinSet;
use vivid_core::media::{self, MediaKind};
use vivid_core::metadata::{FfmpegDispatch, GenerationMetadata};
use vivid_core::tier;
use vivid_db::models::generation::Generation;
use vivid_db::models::profile::Profile;
use vivid_db::repositories::GenerationRepo;

use crate::config::FfmpegConfig;

/// Errors from the FFmpeg collaborator API.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("FFmpeg service error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Endpoint path for a task name, honoring the deployment's URL shape.
pub fn endpoint_path(name: &str, edge_endpoints: bool) -> String {
    if edge_endpoints {
        format!("/{name}")
    } else {
        format!("/api/v1/{name}")
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the FFmpeg collaborator service.
pub struct FfmpegClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    edge_endpoints: bool,
}

impl FfmpegClient {
    /// Build a client from config; `None` when post-processing is
    /// disabled or the service URL is unset.
    pub fn from_config(
        client: reqwest::Client,
        config: &FfmpegConfig,
        auth_token: Option<String>,
    ) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let base_url = config.service_url.clone()?;
        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            edge_endpoints: config.edge_endpoints,
        })
    }

    /// Fire one task at the collaborator.
    pub async fn dispatch(&self, name: &str, body: &Value) -> Result<Value, FfmpegError> {
        let url = format!("{}{}", self.base_url, endpoint_path(name, self.edge_endpoints));
        tracing::debug!(url, "Calling FFmpeg service");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FfmpegError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

// ---------------------------------------------------------------------------
// Dispatch decision
// ---------------------------------------------------------------------------

/// Decide and fire post-processing tasks for a completed generation.
///
/// The video gate is checked here, independently of the caller: image
/// and audio generations never reach the collaborator even if routed in
/// by mistake, and an unclassifiable output means "do nothing".
pub async fn dispatch_post_processing(
    pool: &PgPool,
    ffmpeg: Arc<FfmpegClient>,
    generation: &Generation,
    video_url: &str,
    profile: Option<&Profile>,
    callback_url: &str,
) {
    if media::classify(Some(&generation.tool_type), Some(video_url)) != Some(MediaKind::Video) {
        tracing::debug!(
            generation_id = %generation.id,
            tool_type = %generation.tool_type,
            "Skipping post-processing for non-video generation"
        );
        return;
    }

    let has_thumbnail =
        generation.thumbnail_url.is_some() || generation.metadata.0.has_thumbnail();

    let watermark_required = profile.map_or(true, Profile::is_free_tier);
    let user_tier = tier::tier_label(
        profile.and_then(|p| p.subscription_tier.as_deref()),
        profile.and_then(|p| p.subscription_status.as_deref()),
    );

    let mut tasks: Vec<(&'static str, Value)> = Vec::new();

    if !has_thumbnail {
        tasks.push((
            "extract-thumbnail",
            json!({
                "generation_id": generation.id,
                "video_url": video_url,
                "user_id": generation.user_id,
                "timestamp": 2.0,
                "width": 1280,
                "height": 720,
                "webhook_url": callback_url,
            }),
        ));
    }

    if watermark_required {
        tasks.push((
            "add-watermark",
            json!({
                "generation_id": generation.id,
                "video_url": video_url,
                "user_id": generation.user_id,
                "position": "bottom-center",
                "opacity": 0.95,
                "scale": 1.2,
                "webhook_url": callback_url,
            }),
        ));
    }

    if tasks.is_empty() {
        tracing::debug!(generation_id = %generation.id, "No post-processing tasks needed");
        return;
    }

    let task_count = tasks.len() as u32;
    let mut set = JoinSet::new();
    for (name, body) in tasks {
        let client = Arc::clone(&ffmpeg);
        set.spawn(async move { (name, client.dispatch(name, &body).await) });
    }

    let mut succeeded = 0u32;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, Ok(_))) => {
                succeeded += 1;
                tracing::info!(generation_id = %generation.id, task = name, "FFmpeg task dispatched");
            }
            Ok((name, Err(e))) => {
                tracing::warn!(generation_id = %generation.id, task = name, error = %e, "FFmpeg task dispatch failed");
            }
            Err(e) => {
                tracing::warn!(generation_id = %generation.id, error = %e, "FFmpeg dispatch task panicked");
            }
        }
    }

    tracing::info!(
        generation_id = %generation.id,
        total = task_count,
        succeeded,
        watermark_required,
        "FFmpeg tasks initiated"
    );

    let patch = GenerationMetadata {
        ffmpeg: Some(FfmpegDispatch {
            initiated: true,
            task_count,
            watermark_required,
            user_tier,
            media_type: "video".to_string(),
            dispatched_at: Utc::now(),
        }),
        ..Default::default()
    };
    if let Err(e) = GenerationRepo::merge_metadata(pool, generation.id, &patch.to_value()).await {
        tracing::warn!(generation_id = %generation.id, error = %e, "Failed to record FFmpeg dispatch metadata");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
