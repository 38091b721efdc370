//! Job submission handlers.
//!
//! All tools share one submission flow: validate, mark the record
//! `processing`, submit to the provider queue with the webhook callback
//! URL, and persist the returned job handle. Submission failures are
//! classified, persisted with full diagnostics, and surfaced to the
//! caller -- never swallowed.
//!
//! `flux-kontext` additionally drives completion through a bounded
//! status poll (its webhooks are unreliable); the webhook remains
//! wired up as a fallback. New tools must use queue + webhook only.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use vivid_core::error::CoreError;
use vivid_core::metadata::{
    ErrorAnalysis, GenerationMetadata, PollRecord, SubmissionError,
};
use vivid_core::types::RecordId;
use vivid_db::repositories::GenerationRepo;
use vivid_fal::{classify_submission, classify_webhook, FalApiError, WebhookEnvelope};

use crate::error::{AppError, AppResult};
use crate::handlers::fal_webhook::finalize_success;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::tools::{
    FluxKontextMaxMultiRequest, FluxKontextRequest, PollPolicy, WanProRequest, KONTEXT_MODEL,
    KONTEXT_MULTI_MODEL, KONTEXT_MULTI_TOOL, KONTEXT_TOOL, WAN_PRO_MODEL, WAN_PRO_TOOL,
};

/// Response body for a successfully queued submission.
#[derive(Debug, Serialize)]
pub struct QueuedGeneration {
    pub generation_id: RecordId,
    pub status: &'static str,
    pub fal_request_id: String,
    pub message: String,
}

/// Everything the shared submission flow needs from a tool.
struct ToolSubmission {
    model: &'static str,
    tool_type: &'static str,
    params: Value,
    output_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/generate/wan-pro
pub async fn wan_pro(
    State(state): State<AppState>,
    Json(request): Json<WanProRequest>,
) -> AppResult<impl IntoResponse> {
    request.validate()?;
    let queued = submit_queued(
        &state,
        request.generation_id,
        request.user_id,
        ToolSubmission {
            model: WAN_PRO_MODEL,
            tool_type: WAN_PRO_TOOL,
            params: request.provider_params(),
            output_format: None,
        },
    )
    .await?;
    Ok(Json(DataResponse { data: queued }))
}

/// POST /api/v1/generate/flux-kontext-max-multi
pub async fn flux_kontext_max_multi(
    State(state): State<AppState>,
    Json(request): Json<FluxKontextMaxMultiRequest>,
) -> AppResult<impl IntoResponse> {
    request.validate()?;
    let queued = submit_queued(
        &state,
        request.generation_id,
        request.user_id,
        ToolSubmission {
            model: KONTEXT_MULTI_MODEL,
            tool_type: KONTEXT_MULTI_TOOL,
            params: request.provider_params(),
            output_format: Some(request.output_format.clone()),
        },
    )
    .await?;
    Ok(Json(DataResponse { data: queued }))
}

/// POST /api/v1/generate/flux-kontext
///
/// Legacy polling variant: after queuing, a bounded background poll
/// drives the generation to a terminal state even if the webhook never
/// arrives.
pub async fn flux_kontext(
    State(state): State<AppState>,
    Json(request): Json<FluxKontextRequest>,
) -> AppResult<impl IntoResponse> {
    request.validate()?;
    let mut queued = submit_queued(
        &state,
        request.generation_id,
        request.user_id,
        ToolSubmission {
            model: KONTEXT_MODEL,
            tool_type: KONTEXT_TOOL,
            params: request.provider_params(),
            output_format: Some(request.output_format.clone()),
        },
    )
    .await?;

    let policy = PollPolicy::default();
    let patch = GenerationMetadata {
        poll: Some(PollRecord {
            mode: "polling".into(),
            attempts: 0,
            last_status: None,
        }),
        ..Default::default()
    };
    GenerationRepo::merge_metadata(&state.pool, request.generation_id, &patch.to_value()).await?;

    tokio::spawn(poll_until_settled(
        state.clone(),
        request.generation_id,
        queued.fal_request_id.clone(),
        policy,
    ));

    queued.status = "polling";
    queued.message = "Generation queued; polling for completion.".into();
    Ok(Json(DataResponse { data: queued }))
}

// ---------------------------------------------------------------------------
// Shared submission flow
// ---------------------------------------------------------------------------

async fn submit_queued(
    state: &AppState,
    generation_id: RecordId,
    user_id: RecordId,
    submission: ToolSubmission,
) -> AppResult<QueuedGeneration> {
    let Some(fal) = state.fal.as_ref() else {
        return Err(AppError::InternalError("FAL_API_KEY not configured".into()));
    };
    let Some(callback_url) = state.config.server.webhook_callback_url() else {
        return Err(AppError::InternalError(
            "PUBLIC_BASE_URL not configured".into(),
        ));
    };

    let marked = GenerationRepo::mark_processing(&state.pool, generation_id, user_id).await?;
    if !marked {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Generation",
            id: generation_id,
        }));
    }

    tracing::info!(
        generation_id = %generation_id,
        model = submission.model,
        "Submitting generation to provider queue"
    );

    let response = match fal
        .submit(submission.model, &submission.params, &callback_url)
        .await
    {
        Ok(response) => response,
        Err(FalApiError::Api { status, body }) => {
            let classified = classify_submission(status, &body);
            tracing::error!(
                generation_id = %generation_id,
                status,
                error_type = classified.error_type.as_str(),
                "Provider rejected submission"
            );

            let patch = GenerationMetadata {
                submission_error: Some(SubmissionError {
                    status_code: Some(i64::from(status)),
                    error_type: classified.error_type.as_str().to_string(),
                    technical_message: classified.technical_message.clone(),
                    response_body: Some(body),
                    request_params: Some(submission.params.clone()),
                    queue_url: Some(format!(
                        "{}/{}",
                        state.config.fal.queue_url, submission.model
                    )),
                    occurred_at: Utc::now(),
                }),
                ..Default::default()
            };
            GenerationRepo::fail_if_processing(
                &state.pool,
                generation_id,
                &classified.user_message,
                &patch.to_value(),
            )
            .await?;

            return Err(AppError::Provider(classified));
        }
        Err(e) => {
            tracing::error!(generation_id = %generation_id, error = %e, "Provider submission failed");
            GenerationRepo::fail_if_active(
                &state.pool,
                generation_id,
                "The AI service is temporarily unavailable. Please try again.",
            )
            .await?;
            return Err(AppError::Fal(e));
        }
    };

    let Some(request_id) = response.request_id else {
        GenerationRepo::fail_if_active(
            &state.pool,
            generation_id,
            "Generation failed. Please try again.",
        )
        .await?;
        return Err(AppError::InternalError(
            "No request_id received from provider queue".into(),
        ));
    };

    let patch = GenerationMetadata {
        fal_request_id: Some(request_id.clone()),
        gateway_request_id: response.gateway_request_id.clone(),
        model: Some(submission.model.to_string()),
        tool_type: Some(submission.tool_type.to_string()),
        output_format: submission.output_format.clone(),
        webhook_url: Some(callback_url),
        queue_submitted_at: Some(Utc::now()),
        ..Default::default()
    };
    GenerationRepo::merge_metadata(&state.pool, generation_id, &patch.to_value()).await?;

    tracing::info!(
        generation_id = %generation_id,
        fal_request_id = %request_id,
        "Generation queued; webhook will handle completion"
    );

    Ok(QueuedGeneration {
        generation_id,
        status: "queued",
        fal_request_id: request_id,
        message: "Generation queued successfully. Webhook will update when complete.".into(),
    })
}

// ---------------------------------------------------------------------------
// Legacy bounded poll
// ---------------------------------------------------------------------------

/// Poll the provider until the job settles or the attempt ceiling is
/// exhausted, then drive the generation to its terminal state.
///
/// The webhook path remains active in parallel; whichever finishes
/// first wins the status guard and the loser becomes a no-op.
async fn poll_until_settled(
    state: AppState,
    generation_id: RecordId,
    request_id: String,
    policy: PollPolicy,
) {
    let Some(fal) = state.fal.clone() else {
        return;
    };

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        let status = match fal.request_status(KONTEXT_MODEL, &request_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    generation_id = %generation_id,
                    attempt,
                    error = %e,
                    "Poll attempt failed"
                );
                continue;
            }
        };

        tracing::debug!(
            generation_id = %generation_id,
            attempt,
            status = %status.status,
            "Poll status"
        );

        match status.status.as_str() {
            "COMPLETED" | "OK" | "SUCCESS" => {
                let result = match fal.request_result(KONTEXT_MODEL, &request_id).await {
                    Ok(result) => result,
                    Err(FalApiError::Api { status, body }) => {
                        let classified = classify_submission(status, &body);
                        let _ = GenerationRepo::fail_if_processing(
                            &state.pool,
                            generation_id,
                            &classified.user_message,
                            &poll_patch(attempt, Some("COMPLETED")).to_value(),
                        )
                        .await;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(generation_id = %generation_id, error = %e, "Result fetch failed, retrying");
                        continue;
                    }
                };

                let Ok(Some(generation)) =
                    GenerationRepo::find_processing_by_request_id(&state.pool, &request_id).await
                else {
                    // Webhook beat the poller to it.
                    return;
                };

                if let Err(e) = finalize_success(&state, &generation, Some(&result)).await {
                    tracing::error!(generation_id = %generation_id, error = %e, "Poll completion failed");
                    return;
                }
                let _ = GenerationRepo::merge_metadata(
                    &state.pool,
                    generation_id,
                    &poll_patch(attempt, Some("COMPLETED")).to_value(),
                )
                .await;
                return;
            }

            "FAILED" | "ERROR" | "CANCELLED" => {
                let envelope = WebhookEnvelope {
                    request_id: Some(request_id.clone()),
                    gateway_request_id: None,
                    status: status.status.clone(),
                    payload: None,
                    error: status.error.clone(),
                    status_code: None,
                    http_status: None,
                };
                let classified = classify_webhook(&envelope);

                let mut patch = poll_patch(attempt, Some(&status.status));
                patch.error_analysis = Some(ErrorAnalysis {
                    error_code: classified.status_code,
                    error_type: classified.error_type.as_str().to_string(),
                    content_violation: classified.error_type
                        == vivid_fal::FalErrorType::ContentViolation,
                    server_error: classified.error_type == vivid_fal::FalErrorType::ServerError,
                    bad_request: classified.error_type == vivid_fal::FalErrorType::BadRequest,
                    raw_error: classified.technical_message.clone(),
                    webhook_status: Some(status.status.clone()),
                    raw_envelope: None,
                    analyzed_at: Utc::now(),
                });

                let _ = GenerationRepo::fail_if_processing(
                    &state.pool,
                    generation_id,
                    &classified.user_message,
                    &patch.to_value(),
                )
                .await;
                tracing::info!(
                    generation_id = %generation_id,
                    error_type = classified.error_type.as_str(),
                    "Generation failed during polling"
                );
                return;
            }

            _ => {}
        }
    }

    // Attempt ceiling exhausted with no terminal status.
    let timed_out = GenerationRepo::fail_if_processing(
        &state.pool,
        generation_id,
        &policy.timeout_message(),
        &poll_patch(policy.max_attempts, None).to_value(),
    )
    .await;
    match timed_out {
        Ok(true) => {
            tracing::warn!(generation_id = %generation_id, "Generation timed out during polling")
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!(generation_id = %generation_id, error = %e, "Timeout update failed")
        }
    }
}

fn poll_patch(attempts: u32, last_status: Option<&str>) -> GenerationMetadata {
    GenerationMetadata {
        poll: Some(PollRecord {
            mode: "polling".into(),
            attempts,
            last_status: last_status.map(String::from),
        }),
        ..Default::default()
    }
}
