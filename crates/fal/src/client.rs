//! HTTP client for the provider's asynchronous queue API.
//!
//! Submission enqueues a job and returns a job handle; completion
//! normally arrives via the signed webhook. The status/result endpoints
//! exist only for the legacy bounded-poll path.

use serde::Deserialize;

/// Client for one provider account.
pub struct FalClient {
    client: reqwest::Client,
    api_key: String,
    queue_url: String,
}

/// Response returned by the queue endpoint after accepting a job.
#[derive(Debug, Deserialize)]
pub struct QueueSubmitResponse {
    /// Job handle used to correlate the completion webhook.
    pub request_id: Option<String>,
    /// Secondary handle some gateway deployments report instead.
    pub gateway_request_id: Option<String>,
}

/// Status snapshot from the polling endpoint.
#[derive(Debug, Deserialize)]
pub struct QueueStatusResponse {
    pub status: String,
    /// Error detail some models attach to a failed status.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Errors from the provider API layer.
#[derive(Debug, thiserror::Error)]
pub enum FalApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },

    /// A 2xx response whose body was not the expected JSON.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl FalClient {
    /// Create a client for the given API key and queue base URL
    /// (e.g. `https://queue.fal.run`).
    pub fn new(api_key: String, queue_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            queue_url: queue_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_key: String, queue_url: String) -> Self {
        Self {
            client,
            api_key,
            queue_url: queue_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submit a job to the queue.
    ///
    /// `model` is the provider model path (e.g.
    /// `fal-ai/wan-pro/image-to-video`). The webhook callback URL is
    /// passed as the `fal_webhook` query parameter; the provider will
    /// POST the outcome there.
    pub async fn submit(
        &self,
        model: &str,
        params: &serde_json::Value,
        webhook_url: &str,
    ) -> Result<QueueSubmitResponse, FalApiError> {
        let url = format!("{}/{model}", self.queue_url);
        let response = self
            .client
            .post(&url)
            .query(&[("fal_webhook", webhook_url)])
            .header("Authorization", format!("Key {}", self.api_key))
            .json(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(FalApiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| FalApiError::InvalidResponse(format!("{e}: {body}")))
    }

    /// Poll the status of a queued job (legacy path).
    pub async fn request_status(
        &self,
        model: &str,
        request_id: &str,
    ) -> Result<QueueStatusResponse, FalApiError> {
        let url = format!("{}/{model}/requests/{request_id}/status", self.queue_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Fetch the final result payload of a completed job (legacy path).
    pub async fn request_result(
        &self,
        model: &str,
        request_id: &str,
    ) -> Result<serde_json::Value, FalApiError> {
        let url = format!("{}/{model}/requests/{request_id}", self.queue_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FalApiError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(FalApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| FalApiError::InvalidResponse(format!("{e}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_url_is_normalized() {
        let client = FalClient::new("key".into(), "https://queue.fal.run/".into());
        assert_eq!(client.queue_url, "https://queue.fal.run");
    }

    #[test]
    fn submit_response_tolerates_missing_handles() {
        let parsed: QueueSubmitResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.request_id.is_none());
        assert!(parsed.gateway_request_id.is_none());

        let parsed: QueueSubmitResponse =
            serde_json::from_str(r#"{"request_id":"abc","gateway_request_id":"def"}"#).unwrap();
        assert_eq!(parsed.request_id.as_deref(), Some("abc"));
        assert_eq!(parsed.gateway_request_id.as_deref(), Some("def"));
    }

    #[test]
    fn api_error_display_includes_status_and_body() {
        let err = FalApiError::Api {
            status: 422,
            body: r#"{"detail":"nsfw"}"#.into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("422"));
        assert!(rendered.contains("nsfw"));
    }
}
