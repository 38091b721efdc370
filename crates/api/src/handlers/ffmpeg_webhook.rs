//! FFmpeg collaborator callback handling.
//!
//! The collaborator reports task outcomes to the same webhook endpoint
//! as the provider, identified by the absence of provider signature
//! headers. It keys on the generation id directly (post-processing
//! lands after completion, so no status filter applies) and merges the
//! outcome into the record: thumbnail URL, watermarked output swap, or
//! a failure note. Failures here never touch the generation's own
//! terminal status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use vivid_core::metadata::{GenerationMetadata, ProcessingRecord};
use vivid_db::repositories::GenerationRepo;

use crate::state::AppState;

/// Callback body from the FFmpeg service.
#[derive(Debug, Deserialize)]
struct FfmpegCallback {
    generation_id: Option<String>,
    processing_id: Option<String>,
    status: Option<String>,
    thumbnail_url: Option<String>,
    watermarked_url: Option<String>,
    error: Option<String>,
}

/// Handle a collaborator callback (dispatched from `receive_webhook`).
pub(crate) async fn handle(state: &AppState, body: &[u8]) -> Response {
    let callback: FfmpegCallback = match serde_json::from_slice(body) {
        Ok(callback) => callback,
        Err(e) => {
            tracing::warn!(error = %e, "FFmpeg callback with invalid JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": "Invalid JSON" })),
            )
                .into_response();
        }
    };

    let Some(generation_id) = callback
        .generation_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Generation ID is required" })),
        )
            .into_response();
    };

    tracing::info!(
        generation_id = %generation_id,
        status = callback.status.as_deref().unwrap_or("unknown"),
        has_thumbnail = callback.thumbnail_url.is_some(),
        has_watermarked = callback.watermarked_url.is_some(),
        "FFmpeg callback received"
    );

    let generation = match GenerationRepo::find_by_id(&state.pool, generation_id).await {
        Ok(Some(generation)) => generation,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "error": "Generation not found" })),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(generation_id = %generation_id, error = %e, "Generation lookup failed");
            return internal_error();
        }
    };

    let status = callback.status.as_deref().unwrap_or_default();
    let now = Utc::now();

    let result: Result<(), sqlx::Error> = async {
        if status == "completed" {
            if let Some(thumbnail_url) = &callback.thumbnail_url {
                let patch = GenerationMetadata {
                    thumbnail_processing: Some(ProcessingRecord {
                        status: "completed".into(),
                        result_url: Some(thumbnail_url.clone()),
                        processing_id: callback.processing_id.clone(),
                        completed_at: Some(now),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                GenerationRepo::set_thumbnail(
                    &state.pool,
                    generation_id,
                    thumbnail_url,
                    &patch.to_value(),
                )
                .await?;
                tracing::info!(generation_id = %generation_id, thumbnail_url, "Thumbnail processing completed");
            }

            if let Some(watermarked_url) = &callback.watermarked_url {
                let patch = GenerationMetadata {
                    watermark_processing: Some(ProcessingRecord {
                        status: "completed".into(),
                        result_url: Some(watermarked_url.clone()),
                        original_url: generation.output_file_url.clone(),
                        processing_id: callback.processing_id.clone(),
                        completed_at: Some(now),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                GenerationRepo::replace_output(
                    &state.pool,
                    generation_id,
                    watermarked_url,
                    &patch.to_value(),
                )
                .await?;
                tracing::info!(generation_id = %generation_id, watermarked_url, "Watermark processing completed");
            }
        } else if status == "failed" {
            let patch = GenerationMetadata {
                ffmpeg_processing: Some(ProcessingRecord {
                    status: "failed".into(),
                    error_message: callback.error.clone(),
                    processing_id: callback.processing_id.clone(),
                    failed_at: Some(now),
                    ..Default::default()
                }),
                ..Default::default()
            };
            GenerationRepo::merge_metadata(&state.pool, generation_id, &patch.to_value()).await?;
            tracing::warn!(
                generation_id = %generation_id,
                error = callback.error.as_deref().unwrap_or("unknown"),
                "FFmpeg processing failed"
            );
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        tracing::error!(generation_id = %generation_id, error = %e, "FFmpeg callback update failed");
        return internal_error();
    }

    (
        StatusCode::OK,
        Json(json!({ "success": true, "generation_id": generation_id })),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "Database update failed" })),
    )
        .into_response()
}
