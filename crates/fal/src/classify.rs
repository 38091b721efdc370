//! Provider error classification.
//!
//! Maps provider failures onto a small taxonomy with separate operator
//! (technical) and user-facing messages. Submission failures carry an
//! HTTP status code; webhook-delivered failures often do not, so that
//! path additionally scans the free-text message for policy keywords.

use serde_json::Value;

use crate::webhook::WebhookEnvelope;

/// Free-text fragments that indicate a content policy rejection.
const VIOLATION_KEYWORDS: &[&str] = &[
    "policy",
    "violation",
    "inappropriate",
    "nsfw",
    "content",
    "unsafe",
    "prohibited",
    "not allowed",
    "rejected",
];

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Classified provider failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FalErrorType {
    ContentViolation,
    BadRequest,
    ServerError,
    QuotaError,
    RateLimit,
    /// Unclassified submission failure.
    ApiError,
    /// Unclassified webhook failure.
    UnknownError,
}

impl FalErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentViolation => "content_violation",
            Self::BadRequest => "bad_request",
            Self::ServerError => "server_error",
            Self::QuotaError => "quota_error",
            Self::RateLimit => "rate_limit",
            Self::ApiError => "api_error",
            Self::UnknownError => "unknown_error",
        }
    }
}

/// A classified provider failure.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub error_type: FalErrorType,
    /// Safe to display to the end user.
    pub user_message: String,
    /// Preserved for operators and diagnostics.
    pub technical_message: String,
    pub status_code: Option<i64>,
    /// Parsed response body, when it was JSON.
    pub details: Option<Value>,
}

// ---------------------------------------------------------------------------
// Submission-time classification
// ---------------------------------------------------------------------------

/// Classify a non-2xx queue submission response.
pub fn classify_submission(status: u16, body: &str) -> ClassifiedError {
    let mut technical_message = format!("Provider API error ({status})");
    let mut details = None;

    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => {
            if let Some(message) = extract_message(&parsed) {
                technical_message = message;
            }
            details = Some(parsed);
        }
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            technical_message = format!("{technical_message}: {snippet}");
        }
    }

    let (error_type, user_message) = match status {
        422 => (
            FalErrorType::ContentViolation,
            "Content policy violation: Your input was flagged by the safety system. \
             Please use family-friendly content.",
        ),
        400 => (
            FalErrorType::BadRequest,
            "Invalid request: Please check your input and try again.",
        ),
        500 | 503 => (
            FalErrorType::ServerError,
            "The AI service is temporarily unavailable. Please try again in a few minutes.",
        ),
        402 | 403 => (
            FalErrorType::QuotaError,
            "Service quota exceeded. Please try again later.",
        ),
        429 => (
            FalErrorType::RateLimit,
            "Too many requests. Please wait a moment before trying again.",
        ),
        _ => {
            if contains_violation_keyword(&technical_message) {
                (
                    FalErrorType::ContentViolation,
                    "Content policy violation detected. Please modify your input.",
                )
            } else {
                (
                    FalErrorType::ApiError,
                    "Generation failed. Please try again.",
                )
            }
        }
    };

    ClassifiedError {
        error_type,
        user_message: user_message.to_string(),
        technical_message,
        status_code: Some(i64::from(status)),
        details,
    }
}

// ---------------------------------------------------------------------------
// Webhook-time classification
// ---------------------------------------------------------------------------

/// Classify a failure reported through the webhook channel.
///
/// The provider does not reliably attach a structured status code on
/// this path, so after the code mapping the raw message is scanned for
/// policy keywords and upgraded to a content violation when they match.
pub fn classify_webhook(envelope: &WebhookEnvelope) -> ClassifiedError {
    let mut technical_message = "Generation failed".to_string();
    let mut status_code: Option<i64> = None;

    let payload_error = envelope
        .payload
        .as_ref()
        .and_then(|p| p.get("error"))
        .cloned();

    for source in [envelope.error.as_ref(), payload_error.as_ref()] {
        let Some(source) = source else { continue };
        if let Some(text) = source.as_str() {
            technical_message = text.to_string();
        } else if let Some(message) = extract_message(source) {
            technical_message = message;
        }
        status_code = source
            .get("status_code")
            .or_else(|| source.get("code"))
            .or_else(|| source.get("status"))
            .and_then(as_code);
        break;
    }

    if status_code.is_none() {
        status_code = envelope.status_code.or(envelope.http_status);
    }

    let (error_type, user_message) = match status_code {
        Some(422) => (
            FalErrorType::ContentViolation,
            "Content Policy Violation: Your input was flagged by our content safety \
             system. Please ensure your prompts and images comply with our content policy."
                .to_string(),
        ),
        Some(500) => (
            FalErrorType::ServerError,
            "Server Error: The AI service is temporarily experiencing issues. \
             Please try again in a few minutes."
                .to_string(),
        ),
        Some(400) => (
            FalErrorType::BadRequest,
            "Invalid Request: There was an issue with your input. Please check \
             your image and prompt, then try again."
                .to_string(),
        ),
        _ => {
            if contains_violation_keyword(&technical_message) {
                (
                    FalErrorType::ContentViolation,
                    "Content Policy Violation: Your input was flagged by our content safety \
                     system. Please ensure your prompts and images comply with our content policy."
                        .to_string(),
                )
            } else {
                (FalErrorType::UnknownError, technical_message.clone())
            }
        }
    };

    ClassifiedError {
        error_type,
        user_message,
        technical_message,
        status_code,
        details: envelope.error.clone(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pull a human-readable message out of a provider error object.
/// Checked in order: `detail` (string or any JSON), `error`, `message`.
fn extract_message(value: &Value) -> Option<String> {
    if let Some(detail) = value.get("detail") {
        return Some(match detail.as_str() {
            Some(s) => s.to_string(),
            None => detail.to_string(),
        });
    }
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Some(error.to_string());
    }
    if let Some(message) = value.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    None
}

fn contains_violation_keyword(message: &str) -> bool {
    let lower = message.to_lowercase();
    VIOLATION_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn as_code(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(body: Value) -> WebhookEnvelope {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn submission_422_is_content_violation() {
        let classified = classify_submission(422, r#"{"detail":"nsfw"}"#);
        assert_eq!(classified.error_type, FalErrorType::ContentViolation);
        assert!(classified.user_message.contains("Content policy violation"));
        assert_eq!(classified.technical_message, "nsfw");
        assert_eq!(classified.status_code, Some(422));
    }

    #[test]
    fn submission_500_is_server_error() {
        let classified = classify_submission(500, "");
        assert_eq!(classified.error_type, FalErrorType::ServerError);
        assert!(classified.user_message.contains("temporarily unavailable"));
    }

    #[test]
    fn submission_503_is_server_error() {
        let classified = classify_submission(503, "upstream down");
        assert_eq!(classified.error_type, FalErrorType::ServerError);
        // Non-JSON body is folded into the technical message, truncated.
        assert!(classified.technical_message.contains("upstream down"));
    }

    #[test]
    fn submission_400_and_429_and_quota() {
        assert_eq!(
            classify_submission(400, "{}").error_type,
            FalErrorType::BadRequest
        );
        assert_eq!(
            classify_submission(429, "{}").error_type,
            FalErrorType::RateLimit
        );
        assert_eq!(
            classify_submission(402, "{}").error_type,
            FalErrorType::QuotaError
        );
        assert_eq!(
            classify_submission(403, "{}").error_type,
            FalErrorType::QuotaError
        );
    }

    #[test]
    fn submission_unknown_status_with_policy_text_upgrades() {
        let classified = classify_submission(418, r#"{"detail":"blocked by content policy"}"#);
        assert_eq!(classified.error_type, FalErrorType::ContentViolation);
    }

    #[test]
    fn submission_unknown_status_is_api_error() {
        let classified = classify_submission(418, r#"{"detail":"weird teapot failure"}"#);
        assert_eq!(classified.error_type, FalErrorType::ApiError);
        assert_eq!(classified.user_message, "Generation failed. Please try again.");
    }

    #[test]
    fn submission_non_json_body_is_truncated() {
        let long_body = "x".repeat(500);
        let classified = classify_submission(500, &long_body);
        assert!(classified.technical_message.len() < 300);
    }

    #[test]
    fn webhook_string_error_with_keyword_is_violation() {
        let env = envelope(json!({
            "status": "FAILED",
            "error": "input rejected as NSFW"
        }));
        let classified = classify_webhook(&env);
        assert_eq!(classified.error_type, FalErrorType::ContentViolation);
        assert_eq!(classified.technical_message, "input rejected as NSFW");
    }

    #[test]
    fn webhook_object_error_with_status_code() {
        let env = envelope(json!({
            "status": "FAILED",
            "error": { "message": "infra exploded", "status_code": 500 }
        }));
        let classified = classify_webhook(&env);
        assert_eq!(classified.error_type, FalErrorType::ServerError);
        assert_eq!(classified.status_code, Some(500));
        assert_eq!(classified.technical_message, "infra exploded");
    }

    #[test]
    fn webhook_payload_error_source_is_consulted() {
        let env = envelope(json!({
            "status": "ERROR",
            "payload": { "error": { "detail": "bad seed value", "code": 400 } }
        }));
        let classified = classify_webhook(&env);
        assert_eq!(classified.error_type, FalErrorType::BadRequest);
        assert_eq!(classified.technical_message, "bad seed value");
    }

    #[test]
    fn webhook_envelope_level_code_is_fallback() {
        let env = envelope(json!({
            "status": "FAILED",
            "error": "something odd",
            "http_status": 422
        }));
        let classified = classify_webhook(&env);
        assert_eq!(classified.error_type, FalErrorType::ContentViolation);
    }

    #[test]
    fn webhook_string_status_code_parses() {
        let env = envelope(json!({
            "status": "FAILED",
            "error": { "message": "oops", "status": "500" }
        }));
        assert_eq!(classify_webhook(&env).status_code, Some(500));
    }

    #[test]
    fn webhook_unclassified_is_unknown_error() {
        let env = envelope(json!({ "status": "FAILED" }));
        let classified = classify_webhook(&env);
        assert_eq!(classified.error_type, FalErrorType::UnknownError);
        assert_eq!(classified.user_message, "Generation failed");
    }

    #[test]
    fn error_type_labels() {
        assert_eq!(FalErrorType::ContentViolation.as_str(), "content_violation");
        assert_eq!(FalErrorType::UnknownError.as_str(), "unknown_error");
    }
}
