//! Per-tool request DTOs, validation, and provider parameter mapping.
//!
//! Each tool validates its required inputs outright and clamps numeric
//! parameters into the provider-documented ranges (clamping, not
//! rejection, is the documented behavior for ranges). Seeds are only
//! forwarded when positive; `-1`/`0` mean "let the provider pick".

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use vivid_core::error::CoreError;
use vivid_core::types::RecordId;

fn default_true() -> bool {
    true
}

fn default_guidance_multi() -> f64 {
    10.5
}

fn default_guidance_kontext() -> f64 {
    3.5
}

fn default_num_images() -> i64 {
    1
}

fn default_steps() -> i64 {
    28
}

fn default_output_format() -> String {
    "png".to_string()
}

fn default_safety_tolerance() -> String {
    "2".to_string()
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

/// Include a seed in provider params only when it is positive.
fn positive_seed(seed: Option<i64>) -> Option<i64> {
    seed.filter(|s| *s > 0)
}

// ---------------------------------------------------------------------------
// wan-pro (image → video, queue + webhook)
// ---------------------------------------------------------------------------

pub const WAN_PRO_MODEL: &str = "fal-ai/wan-pro/image-to-video";
pub const WAN_PRO_TOOL: &str = "wan-pro";

/// Body for `POST /api/v1/generate/wan-pro`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WanProRequest {
    pub generation_id: RecordId,
    pub user_id: RecordId,
    pub image_url: String,
    pub prompt: String,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default = "default_true")]
    pub enable_safety_checker: bool,
}

impl WanProRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.image_url.trim().is_empty() {
            return Err(CoreError::Validation("Image URL is required".into()));
        }
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt is required".into()));
        }
        Ok(())
    }

    pub fn provider_params(&self) -> Value {
        let mut params = json!({
            "image_url": self.image_url,
            "prompt": self.prompt.trim(),
            "enable_safety_checker": self.enable_safety_checker,
        });
        if let Some(seed) = positive_seed(self.seed) {
            params["seed"] = json!(seed);
        }
        params
    }
}

// ---------------------------------------------------------------------------
// flux-kontext-max-multi (multi-image, queue + webhook)
// ---------------------------------------------------------------------------

pub const KONTEXT_MULTI_MODEL: &str = "fal-ai/flux-pro/kontext/max/multi";
pub const KONTEXT_MULTI_TOOL: &str = "flux-kontext-max-multi";

/// Body for `POST /api/v1/generate/flux-kontext-max-multi`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxKontextMaxMultiRequest {
    pub generation_id: RecordId,
    pub user_id: RecordId,
    pub prompt: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default = "default_guidance_multi")]
    pub guidance_scale: f64,
    #[serde(default = "default_num_images")]
    pub num_images: i64,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_safety_tolerance")]
    pub safety_tolerance: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default)]
    pub seed: Option<i64>,
}

impl FluxKontextMaxMultiRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt is required".into()));
        }
        if self.image_urls.is_empty() {
            return Err(CoreError::Validation(
                "At least one image URL is required".into(),
            ));
        }
        if self.image_urls.len() > 10 {
            return Err(CoreError::Validation("Maximum 10 images allowed".into()));
        }
        Ok(())
    }

    pub fn provider_params(&self) -> Value {
        let mut params = json!({
            "prompt": self.prompt.trim(),
            "image_urls": self.image_urls,
            "guidance_scale": self.guidance_scale.clamp(1.0, 20.0),
            "num_images": self.num_images.clamp(1, 6),
            "output_format": self.output_format,
            "safety_tolerance": self.safety_tolerance,
            "aspect_ratio": self.aspect_ratio,
        });
        if let Some(seed) = positive_seed(self.seed) {
            params["seed"] = json!(seed);
        }
        params
    }
}

// ---------------------------------------------------------------------------
// flux-kontext (image edit, legacy bounded polling)
// ---------------------------------------------------------------------------

pub const KONTEXT_MODEL: &str = "fal-ai/flux-kontext/dev";
pub const KONTEXT_TOOL: &str = "flux-kontext";

/// Body for `POST /api/v1/generate/flux-kontext`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxKontextRequest {
    pub generation_id: RecordId,
    pub user_id: RecordId,
    pub image_url: String,
    pub prompt: String,
    #[serde(default = "default_guidance_kontext")]
    pub guidance_scale: f64,
    #[serde(default = "default_steps")]
    pub num_inference_steps: i64,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default)]
    pub seed: Option<i64>,
}

impl FluxKontextRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.image_url.trim().is_empty() {
            return Err(CoreError::Validation("Image URL is required".into()));
        }
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt is required".into()));
        }
        Ok(())
    }

    pub fn provider_params(&self) -> Value {
        let mut params = json!({
            "image_url": self.image_url,
            "prompt": self.prompt.trim(),
            "guidance_scale": self.guidance_scale.clamp(1.0, 20.0),
            "num_inference_steps": self.num_inference_steps.clamp(10, 50),
            "output_format": self.output_format,
        });
        if let Some(seed) = positive_seed(self.seed) {
            params["seed"] = json!(seed);
        }
        params
    }
}

// ---------------------------------------------------------------------------
// Poll policy (legacy path)
// ---------------------------------------------------------------------------

/// Cadence and ceiling for the legacy status-polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    /// User-facing message when the attempt ceiling is exhausted.
    pub fn timeout_message(&self) -> String {
        let total_secs = u64::from(self.max_attempts) * self.interval.as_secs();
        format!("Generation timed out after {} minutes", total_secs / 60)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
