//! Server and collaborator configuration loaded from environment
//! variables.
//!
//! All fields have defaults suitable for local development where
//! possible. Credentials and service URLs for optional collaborators
//! (object storage, the FFmpeg service) are `Option`s: their absence
//! disables the dependent code path instead of crashing.

/// Known-problem provider models whose webhooks arrive with broken
/// signatures. Deliveries for these skip verification; see
/// `handlers::fal_webhook`.
const DEFAULT_SIGNATURE_BYPASS_MODELS: &[&str] = &[
    "fal-ai/flux-kontext-lora/text-to-image",
    "fal-ai/flux-kontext/dev",
];

/// Aggregate configuration for the whole service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub fal: FalConfig,
    pub storage: StorageConfig,
    pub ffmpeg: FfmpegConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            fal: FalConfig::from_env(),
            storage: StorageConfig::from_env(),
            ffmpeg: FfmpegConfig::from_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Externally reachable base URL, used to build the webhook callback
    /// URL handed to the provider and the FFmpeg service.
    pub public_base_url: Option<String>,
}

impl ServerConfig {
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `HOST`                 | `0.0.0.0`               |
    /// | `PORT`                 | `3000`                  |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                    |
    /// | `PUBLIC_BASE_URL`      | unset                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let public_base_url = std::env::var("PUBLIC_BASE_URL").ok();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            public_base_url,
        }
    }

    /// The callback URL the provider and the FFmpeg service POST to.
    pub fn webhook_callback_url(&self) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/api/v1/webhooks/fal", base.trim_end_matches('/')))
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Provider (FAL) configuration.
#[derive(Debug, Clone)]
pub struct FalConfig {
    /// API key; submission endpoints are inoperative without it.
    pub api_key: Option<String>,
    /// Queue base URL (default: `https://queue.fal.run`).
    pub queue_url: String,
    /// JWKS document URL for webhook signature verification.
    pub jwks_url: String,
    /// Models whose webhooks skip signature verification.
    pub signature_bypass_models: Vec<String>,
}

impl FalConfig {
    /// | Env Var                       | Default                                             |
    /// |-------------------------------|-----------------------------------------------------|
    /// | `FAL_API_KEY`                 | unset                                               |
    /// | `FAL_QUEUE_URL`               | `https://queue.fal.run`                             |
    /// | `FAL_JWKS_URL`                | `https://rest.alpha.fal.ai/.well-known/jwks.json`   |
    /// | `FAL_SIGNATURE_BYPASS_MODELS` | the known-problem kontext models                    |
    pub fn from_env() -> Self {
        let api_key = std::env::var("FAL_API_KEY").ok();
        let queue_url =
            std::env::var("FAL_QUEUE_URL").unwrap_or_else(|_| "https://queue.fal.run".into());
        let jwks_url = std::env::var("FAL_JWKS_URL")
            .unwrap_or_else(|_| "https://rest.alpha.fal.ai/.well-known/jwks.json".into());

        let signature_bypass_models: Vec<String> = match std::env::var("FAL_SIGNATURE_BYPASS_MODELS")
        {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_SIGNATURE_BYPASS_MODELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        Self {
            api_key,
            queue_url,
            jwks_url,
            signature_bypass_models,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Object storage configuration. Unset URL or key disables
/// materialization (outputs keep their ephemeral provider URLs).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: Option<String>,
    pub service_key: Option<String>,
    /// Bucket for user media (default: `user-files`).
    pub bucket: String,
}

impl StorageConfig {
    /// | Env Var               | Default      |
    /// |-----------------------|--------------|
    /// | `STORAGE_URL`         | unset        |
    /// | `STORAGE_SERVICE_KEY` | unset        |
    /// | `STORAGE_BUCKET`      | `user-files` |
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("STORAGE_URL").ok(),
            service_key: std::env::var("STORAGE_SERVICE_KEY").ok(),
            bucket: std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "user-files".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// FFmpeg collaborator
// ---------------------------------------------------------------------------

/// FFmpeg post-processing service configuration. Disabled unless both
/// the URL is set and the enable flag is on.
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub service_url: Option<String>,
    pub enabled: bool,
    /// Some deployments expose the bare `/extract-thumbnail` endpoints
    /// instead of `/api/v1/extract-thumbnail`.
    pub edge_endpoints: bool,
}

impl FfmpegConfig {
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `FFMPEG_SERVICE_URL`         | unset   |
    /// | `ENABLE_FFMPEG_PROCESSING`   | `false` |
    /// | `USE_EDGE_FUNCTION_ENDPOINTS`| `false` |
    pub fn from_env() -> Self {
        Self {
            service_url: std::env::var("FFMPEG_SERVICE_URL").ok(),
            enabled: std::env::var("ENABLE_FFMPEG_PROCESSING").as_deref() == Ok("true"),
            edge_endpoints: std::env::var("USE_EDGE_FUNCTION_ENDPOINTS").as_deref() == Ok("true"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_callback_url_from_base() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec![],
            request_timeout_secs: 30,
            public_base_url: Some("https://app.example.com/".into()),
        };
        assert_eq!(
            config.webhook_callback_url().as_deref(),
            Some("https://app.example.com/api/v1/webhooks/fal")
        );
    }

    #[test]
    fn default_bypass_list_names_the_known_problem_models() {
        assert!(DEFAULT_SIGNATURE_BYPASS_MODELS
            .contains(&"fal-ai/flux-kontext-lora/text-to-image"));
        assert!(DEFAULT_SIGNATURE_BYPASS_MODELS.contains(&"fal-ai/flux-kontext/dev"));
    }

    #[test]
    fn webhook_callback_url_requires_base() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec![],
            request_timeout_secs: 30,
            public_base_url: None,
        };
        assert!(config.webhook_callback_url().is_none());
    }
}
