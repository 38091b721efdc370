//! Webhook envelope and payload output resolution.
//!
//! The provider's completion payload is polymorphic: the output may be
//! a video object, a bare URL, a single image, or an array of images
//! depending on the model. [`resolve_output`] collapses those shapes
//! into one tagged union in a fixed priority order; a payload matching
//! none of them is an explicit error, never a silent empty result.

use serde::Deserialize;
use serde_json::Value;

/// Statuses the provider reports for a finished job.
const SUCCESS_STATUSES: &[&str] = &["OK", "COMPLETED", "SUCCESS"];
const FAILURE_STATUSES: &[&str] = &["FAILED", "ERROR", "CANCELLED"];

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The signed JSON body of a provider webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub gateway_request_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub http_status: Option<i64>,
}

/// Coarse outcome class of a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Success,
    Failure,
    /// Queue progress notification; no status transition.
    Interim,
}

impl WebhookEnvelope {
    /// The correlation id, whichever field the provider used.
    pub fn correlation_id(&self) -> Option<&str> {
        self.request_id
            .as_deref()
            .or(self.gateway_request_id.as_deref())
    }

    /// Classify the delivery by its status string.
    pub fn outcome(&self) -> WebhookOutcome {
        let status = self.status.as_str();
        if SUCCESS_STATUSES.contains(&status) {
            WebhookOutcome::Success
        } else if FAILURE_STATUSES.contains(&status) {
            WebhookOutcome::Failure
        } else {
            WebhookOutcome::Interim
        }
    }

    /// Seed echoed back in the payload, when present.
    pub fn seed(&self) -> Option<i64> {
        self.payload.as_ref()?.get("seed")?.as_i64()
    }
}

// ---------------------------------------------------------------------------
// Output resolution
// ---------------------------------------------------------------------------

/// The output reference(s) extracted from a success payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOutput {
    /// A video object (`payload.video` as object, or as a bare string).
    Video {
        url: String,
        content_type: Option<String>,
        thumbnail_url: Option<String>,
        file_size: Option<i64>,
    },
    /// A top-level bare URL (`payload.url`).
    BareUrl {
        url: String,
        thumbnail_url: Option<String>,
    },
    /// An array of images (`payload.images`).
    ImageBatch { urls: Vec<String> },
    /// A single image (`payload.image` as object or string).
    Image { url: String },
}

impl ResolvedOutput {
    /// The primary URL (first of a batch).
    pub fn primary_url(&self) -> &str {
        match self {
            Self::Video { url, .. } | Self::BareUrl { url, .. } | Self::Image { url } => url,
            Self::ImageBatch { urls } => &urls[0],
        }
    }

    /// Provider-supplied thumbnail, when the shape carries one.
    pub fn thumbnail_url(&self) -> Option<&str> {
        match self {
            Self::Video { thumbnail_url, .. } | Self::BareUrl { thumbnail_url, .. } => {
                thumbnail_url.as_deref()
            }
            _ => None,
        }
    }
}

/// Failure to extract any output reference from a success payload.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OutputError {
    #[error("webhook carried no payload")]
    MissingPayload,
    #[error("no output URL in webhook payload")]
    NoOutputUrl,
}

/// Extract the output reference(s) from a success payload.
///
/// Shapes are probed in fixed priority order: video object, video
/// string, bare URL, image array, image object, image string.
pub fn resolve_output(payload: Option<&Value>) -> Result<ResolvedOutput, OutputError> {
    let payload = payload.ok_or(OutputError::MissingPayload)?;

    if let Some(video) = payload.get("video") {
        if let Some(url) = video.get("url").and_then(Value::as_str) {
            return Ok(ResolvedOutput::Video {
                url: url.to_string(),
                content_type: video
                    .get("content_type")
                    .and_then(Value::as_str)
                    .map(String::from),
                thumbnail_url: nested_url(video, "preview")
                    .or_else(|| nested_url(video, "thumbnail"))
                    .or_else(|| payload_thumbnail(payload)),
                file_size: video.get("file_size").and_then(Value::as_i64),
            });
        }
        if let Some(url) = video.as_str() {
            return Ok(ResolvedOutput::Video {
                url: url.to_string(),
                content_type: None,
                thumbnail_url: payload_thumbnail(payload),
                file_size: None,
            });
        }
    }

    if let Some(url) = payload.get("url").and_then(Value::as_str) {
        return Ok(ResolvedOutput::BareUrl {
            url: url.to_string(),
            thumbnail_url: payload_thumbnail(payload),
        });
    }

    if let Some(images) = payload.get("images").and_then(Value::as_array) {
        let urls: Vec<String> = images
            .iter()
            .filter_map(|img| {
                img.get("url")
                    .and_then(Value::as_str)
                    .or_else(|| img.as_str())
                    .map(String::from)
            })
            .collect();
        if urls.is_empty() {
            return Err(OutputError::NoOutputUrl);
        }
        return Ok(ResolvedOutput::ImageBatch { urls });
    }

    if let Some(image) = payload.get("image") {
        if let Some(url) = image.get("url").and_then(Value::as_str) {
            return Ok(ResolvedOutput::Image {
                url: url.to_string(),
            });
        }
        if let Some(url) = image.as_str() {
            return Ok(ResolvedOutput::Image {
                url: url.to_string(),
            });
        }
    }

    Err(OutputError::NoOutputUrl)
}

/// Thumbnail candidates at the payload level, in priority order.
fn payload_thumbnail(payload: &Value) -> Option<String> {
    nested_url(payload, "preview")
        .or_else(|| nested_url(payload, "thumbnail"))
        .or_else(|| nested_url(payload, "first_frame"))
}

fn nested_url(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)?
        .get("url")?
        .as_str()
        .map(String::from)
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
    fn correlation_id_prefers_request_id() {
        let env = envelope(json!({
            "request_id": "a", "gateway_request_id": "b", "status": "OK"
        }));
        assert_eq!(env.correlation_id(), Some("a"));

        let env = envelope(json!({ "gateway_request_id": "b", "status": "OK" }));
        assert_eq!(env.correlation_id(), Some("b"));
    }

    #[test]
    fn outcome_classification() {
        for status in ["OK", "COMPLETED", "SUCCESS"] {
            let env = envelope(json!({ "status": status }));
            assert_eq!(env.outcome(), WebhookOutcome::Success);
        }
        for status in ["FAILED", "ERROR", "CANCELLED"] {
            let env = envelope(json!({ "status": status }));
            assert_eq!(env.outcome(), WebhookOutcome::Failure);
        }
        for status in ["IN_QUEUE", "IN_PROGRESS", "anything"] {
            let env = envelope(json!({ "status": status }));
            assert_eq!(env.outcome(), WebhookOutcome::Interim);
        }
    }

    #[test]
    fn resolves_video_object_with_nested_thumbnail() {
        let payload = json!({
            "video": {
                "url": "https://p/out.mp4",
                "content_type": "video/mp4",
                "file_size": 1048576,
                "thumbnail": { "url": "https://p/thumb.jpg" }
            }
        });
        let resolved = resolve_output(Some(&payload)).unwrap();
        assert_eq!(
            resolved,
            ResolvedOutput::Video {
                url: "https://p/out.mp4".into(),
                content_type: Some("video/mp4".into()),
                thumbnail_url: Some("https://p/thumb.jpg".into()),
                file_size: Some(1048576),
            }
        );
    }

    #[test]
    fn video_object_falls_back_to_payload_thumbnail() {
        let payload = json!({
            "video": { "url": "https://p/out.mp4" },
            "first_frame": { "url": "https://p/frame.jpg" }
        });
        let resolved = resolve_output(Some(&payload)).unwrap();
        assert_eq!(resolved.thumbnail_url(), Some("https://p/frame.jpg"));
    }

    #[test]
    fn resolves_video_string() {
        let payload = json!({
            "video": "https://p/out.mp4",
            "preview": { "url": "https://p/prev.jpg" }
        });
        let resolved = resolve_output(Some(&payload)).unwrap();
        assert_eq!(resolved.primary_url(), "https://p/out.mp4");
        assert_eq!(resolved.thumbnail_url(), Some("https://p/prev.jpg"));
    }

    #[test]
    fn resolves_bare_url() {
        let payload = json!({ "url": "https://p/out.bin" });
        let resolved = resolve_output(Some(&payload)).unwrap();
        assert_eq!(
            resolved,
            ResolvedOutput::BareUrl {
                url: "https://p/out.bin".into(),
                thumbnail_url: None,
            }
        );
    }

    #[test]
    fn resolves_single_image_object() {
        let payload = json!({ "image": { "url": "https://p/x.png" } });
        let resolved = resolve_output(Some(&payload)).unwrap();
        assert_eq!(
            resolved,
            ResolvedOutput::Image {
                url: "https://p/x.png".into()
            }
        );
    }

    #[test]
    fn resolves_image_string() {
        let payload = json!({ "image": "https://p/x.png" });
        assert_eq!(
            resolve_output(Some(&payload)).unwrap().primary_url(),
            "https://p/x.png"
        );
    }

    #[test]
    fn resolves_image_batch_of_objects_and_strings() {
        let payload = json!({
            "images": [
                { "url": "https://p/1.png" },
                "https://p/2.png",
                { "url": "https://p/3.png" }
            ]
        });
        let resolved = resolve_output(Some(&payload)).unwrap();
        assert_eq!(
            resolved,
            ResolvedOutput::ImageBatch {
                urls: vec![
                    "https://p/1.png".into(),
                    "https://p/2.png".into(),
                    "https://p/3.png".into(),
                ]
            }
        );
    }

    #[test]
    fn images_array_takes_priority_over_image_field() {
        let payload = json!({
            "images": [{ "url": "https://p/1.png" }],
            "image": { "url": "https://p/other.png" }
        });
        assert_eq!(
            resolve_output(Some(&payload)).unwrap().primary_url(),
            "https://p/1.png"
        );
    }

    #[test]
    fn empty_image_batch_is_no_output() {
        let payload = json!({ "images": [] });
        assert_eq!(
            resolve_output(Some(&payload)),
            Err(OutputError::NoOutputUrl)
        );
    }

    #[test]
    fn unrecognized_shape_is_no_output() {
        let payload = json!({ "detail": "something else" });
        assert_eq!(
            resolve_output(Some(&payload)),
            Err(OutputError::NoOutputUrl)
        );
        assert_eq!(resolve_output(None), Err(OutputError::MissingPayload));
    }
}
