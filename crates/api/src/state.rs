use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use vivid_core::dedup::DedupCache;
use vivid_db::DbPool;
use vivid_fal::{FalClient, JwksCache, JwksClient};

use crate::config::AppConfig;
use crate::ffmpeg::FfmpegClient;
use crate::materialize::ObjectStore;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`). The two
/// caches here (`jwks_cache`, `dedup`) are process-local optimizations;
/// losing them on restart is harmless.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Service configuration.
    pub config: Arc<AppConfig>,
    /// Shared HTTP client for downloads and collaborator calls.
    pub http: reqwest::Client,
    /// Provider queue client; `None` when `FAL_API_KEY` is unset, which
    /// disables the submission endpoints.
    pub fal: Option<Arc<FalClient>>,
    /// Fetcher for the provider's webhook signing keys.
    pub jwks_client: Arc<JwksClient>,
    /// Cached provider key set (24 h TTL).
    pub jwks_cache: Arc<RwLock<JwksCache>>,
    /// Webhook deduplication cache (60 s window).
    pub dedup: Arc<Mutex<DedupCache>>,
    /// Object storage for materialized media; `None` disables
    /// materialization (outputs keep provider URLs).
    pub store: Option<Arc<ObjectStore>>,
    /// FFmpeg collaborator client; `None` disables post-processing.
    pub ffmpeg: Option<Arc<FfmpegClient>>,
}

impl AppState {
    /// Wire up all collaborator clients from configuration.
    pub fn new(pool: DbPool, config: AppConfig) -> Self {
        let http = reqwest::Client::new();

        let fal = config.fal.api_key.clone().map(|key| {
            Arc::new(FalClient::with_client(
                http.clone(),
                key,
                config.fal.queue_url.clone(),
            ))
        });

        let jwks_client = Arc::new(JwksClient::new(http.clone(), config.fal.jwks_url.clone()));

        let store = ObjectStore::from_config(http.clone(), &config.storage).map(Arc::new);

        // The collaborator authenticates with the same service-role key
        // as object storage.
        let ffmpeg = FfmpegClient::from_config(
            http.clone(),
            &config.ffmpeg,
            config.storage.service_key.clone(),
        )
        .map(Arc::new);

        Self {
            pool,
            config: Arc::new(config),
            http,
            fal,
            jwks_client,
            jwks_cache: Arc::new(RwLock::new(JwksCache::new())),
            dedup: Arc::new(Mutex::new(DedupCache::default())),
            store,
            ffmpeg,
        }
    }
}
