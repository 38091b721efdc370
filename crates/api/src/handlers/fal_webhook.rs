//! Provider webhook reconciliation.
//!
//! One endpoint receives both the provider's signed completion webhooks
//! and the FFmpeg collaborator's callbacks; the two are told apart by
//! the presence of the provider signature headers. Provider deliveries
//! pass through signature verification and deduplication, then drive
//! the generation state machine: `processing → completed` on success,
//! `processing → failed` on failure, metadata-only updates for interim
//! statuses. Every reconciled branch answers 200 so the provider stops
//! retrying; only a signature failure (403) and an unknown correlation
//! id (404) say otherwise.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use vivid_core::media::{self, MediaKind, PayloadHint};
use vivid_core::metadata::{ErrorAnalysis, GenerationMetadata, MediaRecord, ProgressNote};
use vivid_core::types::RecordId;
use vivid_db::models::generation::Generation;
use vivid_db::repositories::{GenerationRepo, ProfileRepo};
use vivid_fal::signature::{self, Jwk, SignatureHeaders};
use vivid_fal::webhook::{resolve_output, ResolvedOutput};
use vivid_fal::{classify_webhook, FalErrorType, WebhookEnvelope, WebhookOutcome};

use crate::error::AppResult;
use crate::ffmpeg;
use crate::handlers::ffmpeg_webhook;
use crate::materialize;
use crate::state::AppState;

/// POST /api/v1/webhooks/fal
///
/// Content-dispatched webhook sink for the provider and the FFmpeg
/// collaborator.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let signature_headers = SignatureHeaders::new(
        header_str(&headers, signature::HEADER_REQUEST_ID),
        header_str(&headers, signature::HEADER_USER_ID),
        header_str(&headers, signature::HEADER_TIMESTAMP),
        header_str(&headers, signature::HEADER_SIGNATURE),
    );

    // No signature headers: this is the FFmpeg collaborator calling back.
    let Some(signature_headers) = signature_headers else {
        return Ok(ffmpeg_webhook::handle(&state, &body).await);
    };

    // Lenient pre-parse for the signature-bypass probe and for the raw
    // envelope preserved in failure diagnostics.
    let raw_body: Option<Value> = serde_json::from_slice(&body).ok();

    if !bypasses_verification(&state, raw_body.as_ref()).await? {
        let keys = current_jwks(&state).await;
        let verified = match keys {
            Some(keys) => signature::verify_signature(
                &signature_headers,
                &body,
                &keys,
                Utc::now().timestamp(),
            ),
            None => false,
        };
        if !verified {
            tracing::error!("Invalid webhook signature");
            return Ok((StatusCode::FORBIDDEN, "Invalid signature").into_response());
        }
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": format!("Invalid JSON: {e}") })),
            )
                .into_response());
        }
    };

    let Some(correlation_id) = envelope.correlation_id().map(str::to_string) else {
        return Ok((StatusCode::BAD_REQUEST, "Missing request_id").into_response());
    };

    // Duplicate deliveries within the window acknowledge without side
    // effects; the provider delivers at-least-once.
    {
        let mut dedup = state.dedup.lock().await;
        if !dedup.should_process(&correlation_id, &envelope.status) {
            tracing::info!(correlation_id, status = %envelope.status, "Duplicate webhook ignored");
            return Ok((
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Duplicate webhook ignored" })),
            )
                .into_response());
        }
    }

    let Some(generation) =
        GenerationRepo::find_processing_by_request_id(&state.pool, &correlation_id).await?
    else {
        // Either a duplicate that lost the status-guard race or a real
        // correlation bug; either way worth surfacing to the provider's
        // delivery log rather than silently acknowledging.
        tracing::warn!(correlation_id, "Webhook matched no in-flight generation");
        return Ok((StatusCode::NOT_FOUND, "Generation not found").into_response());
    };

    tracing::info!(
        generation_id = %generation.id,
        tool_type = %generation.tool_type,
        status = %envelope.status,
        "Provider webhook received"
    );

    match envelope.outcome() {
        WebhookOutcome::Success => handle_success(&state, generation, &envelope).await,
        WebhookOutcome::Failure => handle_failure(&state, generation, &envelope, raw_body).await,
        WebhookOutcome::Interim => handle_interim(&state, generation, &envelope).await,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ---------------------------------------------------------------------------
// Signature bypass + JWKS
// ---------------------------------------------------------------------------

/// Whether this delivery's generation was submitted against a model on
/// the signature-bypass list.
///
/// The decision keys off the model we recorded at submission, looked up
/// by correlation id -- never off anything in the (unverified) payload.
async fn bypasses_verification(
    state: &AppState,
    raw_body: Option<&Value>,
) -> Result<bool, sqlx::Error> {
    let Some(raw) = raw_body else {
        return Ok(false);
    };
    let correlation_id = raw
        .get("request_id")
        .and_then(Value::as_str)
        .or_else(|| raw.get("gateway_request_id").and_then(Value::as_str));
    let Some(correlation_id) = correlation_id else {
        return Ok(false);
    };

    let Some(model) = GenerationRepo::find_model_by_request_id(&state.pool, correlation_id).await?
    else {
        return Ok(false);
    };

    if state
        .config
        .fal
        .signature_bypass_models
        .iter()
        .any(|m| *m == model)
    {
        tracing::warn!(model, "Skipping signature verification for known-problem model");
        return Ok(true);
    }
    Ok(false)
}

/// The current provider key set: cached for 24 h, refetched
/// synchronously on expiry. `None` (fetch failure) rejects the webhook.
async fn current_jwks(state: &AppState) -> Option<Vec<Jwk>> {
    let now = Instant::now();
    {
        let cache = state.jwks_cache.read().await;
        if let Some(keys) = cache.fresh_keys(now) {
            return Some(keys.to_vec());
        }
    }
    match state.jwks_client.fetch().await {
        Ok(keys) => {
            let mut cache = state.jwks_cache.write().await;
            cache.store(keys.clone(), now);
            Some(keys)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch provider JWKS");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------

/// Result of driving a success payload through materialization and the
/// guarded completion update.
pub(crate) enum FinalizeResult {
    Completed { output_file_url: String },
    /// The payload carried no usable output; the generation was failed.
    NoOutput,
    /// Another delivery finalized the record first; this one is a no-op.
    RaceLost,
}

async fn handle_success(
    state: &AppState,
    generation: Generation,
    envelope: &WebhookEnvelope,
) -> AppResult<Response> {
    let generation_id = generation.id;
    match finalize_success(state, &generation, envelope.payload.as_ref()).await? {
        FinalizeResult::NoOutput => {
            Ok((StatusCode::BAD_REQUEST, "No output URL").into_response())
        }
        FinalizeResult::RaceLost => Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Generation already finalized" })),
        )
            .into_response()),
        FinalizeResult::Completed { .. } => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Generation completed",
                "generation_id": generation_id,
            })),
        )
            .into_response()),
    }
}

/// Complete a generation from a provider success payload.
///
/// Shared between the webhook path and the legacy poller: resolves the
/// output shape, materializes media (best-effort), persists the guarded
/// completion, and dispatches post-processing for video outputs.
pub(crate) async fn finalize_success(
    state: &AppState,
    generation: &Generation,
    payload: Option<&Value>,
) -> Result<FinalizeResult, sqlx::Error> {
    let resolved = match resolve_output(payload) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(generation_id = %generation.id, error = %e, "Success webhook without usable output");
            GenerationRepo::fail_if_processing(
                &state.pool,
                generation.id,
                "No output URL in webhook",
                &json!({}),
            )
            .await?;
            return Ok(FinalizeResult::NoOutput);
        }
    };

    let meta = &generation.metadata.0;
    let output_format = meta.output_format.as_deref();
    let tool_folder = if generation.tool_type.is_empty() {
        meta.tool_type.as_deref().unwrap_or("fal-generation")
    } else {
        generation.tool_type.as_str()
    };
    let timestamp_ms = Utc::now().timestamp_millis();
    let store = state.store.as_deref();

    let (output_file_url, thumbnail_url, media_record) = match &resolved {
        ResolvedOutput::ImageBatch { urls } => {
            let inferred = media::image_file(output_format);
            let mut final_urls = Vec::with_capacity(urls.len());
            for (index, url) in urls.iter().enumerate() {
                let stored = materialize::materialize_url(
                    &state.http,
                    store,
                    generation.user_id,
                    tool_folder,
                    url,
                    &inferred,
                    timestamp_ms,
                    Some(index),
                )
                .await;
                final_urls.push(stored);
            }

            let output_file_url = materialize::batch_output_value(&final_urls);

            let record = MediaRecord {
                original_provider_url: Some(urls[0].clone()),
                permanent_url: (final_urls[0] != urls[0]).then(|| final_urls[0].clone()),
                all_urls: (final_urls.len() > 1).then(|| final_urls.clone()),
                content_type: Some(inferred.content_type.clone()),
                completed_via_webhook: Some(true),
                ..Default::default()
            };
            (output_file_url, None, record)
        }

        ResolvedOutput::Video { .. } | ResolvedOutput::BareUrl { .. } | ResolvedOutput::Image { .. } => {
            let (source_url, hint, provider_thumbnail, file_size) = match &resolved {
                ResolvedOutput::Video {
                    url,
                    content_type,
                    thumbnail_url,
                    file_size,
                } => (
                    url.clone(),
                    PayloadHint::Video {
                        content_type: content_type.clone(),
                    },
                    thumbnail_url.clone(),
                    *file_size,
                ),
                ResolvedOutput::BareUrl { url, thumbnail_url } => {
                    (url.clone(), PayloadHint::None, thumbnail_url.clone(), None)
                }
                ResolvedOutput::Image { url } => {
                    (url.clone(), PayloadHint::Image, None, None)
                }
                ResolvedOutput::ImageBatch { .. } => unreachable!("handled above"),
            };

            let inferred = media::infer_output_file(Some(tool_folder), &hint, output_format);
            let final_url = materialize::materialize_url(
                &state.http,
                store,
                generation.user_id,
                tool_folder,
                &source_url,
                &inferred,
                timestamp_ms,
                None,
            )
            .await;

            let stored_thumbnail = match &provider_thumbnail {
                Some(thumb_url) => Some(
                    materialize::materialize_thumbnail(
                        &state.http,
                        store,
                        generation.user_id,
                        tool_folder,
                        thumb_url,
                        timestamp_ms,
                    )
                    .await,
                ),
                None => None,
            };

            let record = MediaRecord {
                original_provider_url: Some(source_url.clone()),
                permanent_url: (final_url != source_url).then(|| final_url.clone()),
                content_type: Some(inferred.content_type.clone()),
                file_size,
                original_thumbnail_url: provider_thumbnail.clone(),
                stored_thumbnail_url: stored_thumbnail.clone(),
                completed_via_webhook: Some(true),
                ..Default::default()
            };
            (final_url, stored_thumbnail, record)
        }
    };

    let mut merged = generation.metadata.0.clone();
    merged.merge(GenerationMetadata {
        seed: payload.and_then(|p| p.get("seed")).and_then(Value::as_i64),
        media: Some(media_record),
        ..Default::default()
    });

    let updated = GenerationRepo::complete_if_processing(
        &state.pool,
        generation.id,
        &output_file_url,
        thumbnail_url.as_deref(),
        &merged.to_value(),
    )
    .await?;

    if !updated {
        tracing::info!(
            generation_id = %generation.id,
            "Generation already finalized by a concurrent delivery"
        );
        return Ok(FinalizeResult::RaceLost);
    }

    tracing::info!(generation_id = %generation.id, "Generation completed");

    maybe_dispatch_post_processing(state, generation.id, &output_file_url).await;

    Ok(FinalizeResult::Completed { output_file_url })
}

/// Dispatch video post-processing when configured and applicable.
///
/// Classification failure degrades to "do nothing"; dispatch errors are
/// logged inside the dispatcher and never reach the webhook response.
async fn maybe_dispatch_post_processing(
    state: &AppState,
    generation_id: RecordId,
    output_url: &str,
) {
    let Some(ffmpeg_client) = state.ffmpeg.clone() else {
        return;
    };
    let Some(callback_url) = state.config.server.webhook_callback_url() else {
        tracing::debug!("PUBLIC_BASE_URL unset, skipping post-processing");
        return;
    };

    // Re-read the finalized row so the dispatcher sees the stored
    // thumbnail and merged metadata.
    let generation = match GenerationRepo::find_by_id(&state.pool, generation_id).await {
        Ok(Some(generation)) => generation,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(generation_id = %generation_id, error = %e, "Reload for post-processing failed");
            return;
        }
    };

    match media::classify(Some(&generation.tool_type), Some(output_url)) {
        Some(MediaKind::Video) => {
            let profile = match ProfileRepo::find_by_id(&state.pool, generation.user_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::info!(error = %e, "Profile lookup failed, continuing as free tier");
                    None
                }
            };
            ffmpeg::dispatch_post_processing(
                &state.pool,
                ffmpeg_client,
                &generation,
                output_url,
                profile.as_ref(),
                &callback_url,
            )
            .await;
        }
        Some(MediaKind::Image) => {
            tracing::debug!(generation_id = %generation.id, "Image generation, skipping post-processing");
        }
        Some(MediaKind::Audio) | None => {
            tracing::debug!(generation_id = %generation.id, "Non-video generation, skipping post-processing");
        }
    }
}

// ---------------------------------------------------------------------------
// Failure path
// ---------------------------------------------------------------------------

async fn handle_failure(
    state: &AppState,
    generation: Generation,
    envelope: &WebhookEnvelope,
    raw_body: Option<Value>,
) -> AppResult<Response> {
    let classified = classify_webhook(envelope);

    let analysis = ErrorAnalysis {
        error_code: classified.status_code,
        error_type: classified.error_type.as_str().to_string(),
        content_violation: classified.error_type == FalErrorType::ContentViolation,
        server_error: classified.error_type == FalErrorType::ServerError,
        bad_request: classified.error_type == FalErrorType::BadRequest,
        raw_error: classified.technical_message.clone(),
        webhook_status: Some(envelope.status.clone()),
        raw_envelope: raw_body,
        analyzed_at: Utc::now(),
    };
    let patch = GenerationMetadata {
        error_analysis: Some(analysis),
        ..Default::default()
    };

    let updated = GenerationRepo::fail_if_processing(
        &state.pool,
        generation.id,
        &classified.user_message,
        &patch.to_value(),
    )
    .await?;

    tracing::info!(
        generation_id = %generation.id,
        error_type = classified.error_type.as_str(),
        updated,
        "Generation marked as failed"
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Failure processed",
            "generation_id": generation.id,
            "error_type": classified.error_type.as_str(),
        })),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Interim path
// ---------------------------------------------------------------------------

async fn handle_interim(
    state: &AppState,
    generation: Generation,
    envelope: &WebhookEnvelope,
) -> AppResult<Response> {
    let patch = GenerationMetadata {
        progress: Some(ProgressNote {
            last_status: envelope.status.clone(),
            updated_at: Utc::now(),
        }),
        ..Default::default()
    };
    GenerationRepo::merge_metadata(&state.pool, generation.id, &patch.to_value()).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Status update received",
            "status": envelope.status,
        })),
    )
        .into_response())
}
