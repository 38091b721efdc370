use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vivid_core::error::CoreError;
use vivid_fal::{ClassifiedError, FalApiError, FalErrorType};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific and
/// collaborator variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `vivid_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A classified provider failure; the user message is shown as-is.
    #[error("Provider failure: {}", .0.technical_message)]
    Provider(ClassifiedError),

    /// An unclassified provider transport/parse failure.
    #[error(transparent)]
    Fal(#[from] FalApiError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- Provider errors ---
            AppError::Provider(classified) => (
                provider_status(classified.error_type),
                provider_code(classified.error_type),
                classified.user_message.clone(),
            ),
            AppError::Fal(err) => {
                tracing::error!(error = %err, "Provider request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    "The AI service is temporarily unavailable. Please try again.".to_string(),
                )
            }
            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// HTTP status for a classified provider failure surfaced to the caller.
fn provider_status(error_type: FalErrorType) -> StatusCode {
    match error_type {
        FalErrorType::ContentViolation => StatusCode::UNPROCESSABLE_ENTITY,
        FalErrorType::BadRequest => StatusCode::BAD_REQUEST,
        FalErrorType::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        FalErrorType::QuotaError => StatusCode::PAYMENT_REQUIRED,
        FalErrorType::ServerError | FalErrorType::ApiError | FalErrorType::UnknownError => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn provider_code(error_type: FalErrorType) -> &'static str {
    match error_type {
        FalErrorType::ContentViolation => "CONTENT_VIOLATION",
        FalErrorType::BadRequest => "BAD_REQUEST",
        FalErrorType::RateLimit => "RATE_LIMIT",
        FalErrorType::QuotaError => "QUOTA_EXCEEDED",
        FalErrorType::ServerError => "SERVER_ERROR",
        FalErrorType::ApiError | FalErrorType::UnknownError => "PROVIDER_ERROR",
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                return (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                );
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(
            provider_status(FalErrorType::ContentViolation),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            provider_status(FalErrorType::RateLimit),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            provider_status(FalErrorType::ServerError),
            StatusCode::BAD_GATEWAY
        );
    }
}
