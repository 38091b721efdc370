//! Media materialization: moving outputs off the provider's ephemeral
//! URLs into durable object storage.
//!
//! Materialization is best-effort by design. The provider URL stays
//! valid for a window after completion, so any download or upload
//! failure falls back to the ephemeral URL rather than failing the
//! generation; the record still reaches `completed`. Items in a
//! multi-image batch are independent -- one failure never aborts the
//! others.

use vivid_core::media::InferredFile;
use vivid_core::types::RecordId;

use crate::config::StorageConfig;

/// Errors from the object storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The storage service returned a non-2xx status code.
    #[error("Storage API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Object paths
// ---------------------------------------------------------------------------

/// Build the deterministic storage key for one output file.
///
/// Layout: `{user_id}/{tool_folder}/{timestamp}[_{index}][_thumbnail].{ext}`.
/// Per-user/per-tool namespacing keeps concurrent generations from
/// colliding; the index suffix keeps items of one batch apart.
pub fn object_path(
    user_id: RecordId,
    tool_folder: &str,
    timestamp_ms: i64,
    index: Option<usize>,
    thumbnail: bool,
    extension: &str,
) -> String {
    let mut name = timestamp_ms.to_string();
    if let Some(index) = index {
        name.push_str(&format!("_{index}"));
    }
    if thumbnail {
        name.push_str("_thumbnail");
    }
    format!("{user_id}/{tool_folder}/{name}.{extension}")
}

/// Encode batch output for the `output_file_url` column: a bare URL for
/// a single item, a JSON-encoded array for a multi-image batch.
pub fn batch_output_value(urls: &[String]) -> String {
    if urls.len() > 1 {
        serde_json::to_string(urls).unwrap_or_else(|_| urls[0].clone())
    } else {
        urls[0].clone()
    }
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// HTTP client for the storage service's object API.
pub struct ObjectStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl ObjectStore {
    /// Build a store from config; `None` when storage is not configured,
    /// which disables materialization entirely.
    pub fn from_config(client: reqwest::Client, config: &StorageConfig) -> Option<Self> {
        let base_url = config.url.clone()?;
        let service_key = config.service_key.clone()?;
        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket: config.bucket.clone(),
        })
    }

    /// Public URL a stored object is served from.
    pub fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{path}", self.base_url, self.bucket)
    }

    /// Upload a file, overwriting any existing object at the path.
    /// Returns the public URL.
    pub async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let url = format!("{}/object/{}/{path}", self.base_url, self.bucket);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(self.public_url(path))
    }
}

// ---------------------------------------------------------------------------
// Materialization
// ---------------------------------------------------------------------------

/// Download one provider URL and re-upload it into durable storage.
///
/// Returns the permanent public URL, or the original URL when storage
/// is unconfigured or any step fails.
pub async fn materialize_url(
    http: &reqwest::Client,
    store: Option<&ObjectStore>,
    user_id: RecordId,
    tool_folder: &str,
    source_url: &str,
    inferred: &InferredFile,
    timestamp_ms: i64,
    index: Option<usize>,
) -> String {
    let Some(store) = store else {
        return source_url.to_string();
    };

    let path = object_path(
        user_id,
        tool_folder,
        timestamp_ms,
        index,
        false,
        inferred.extension,
    );

    match download(http, source_url).await {
        Ok(bytes) => match store.upload(&path, bytes, &inferred.content_type).await {
            Ok(public_url) => {
                tracing::info!(path, "Output stored permanently");
                public_url
            }
            Err(e) => {
                tracing::warn!(error = %e, source_url, "Storage upload failed, keeping provider URL");
                source_url.to_string()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, source_url, "Output download failed, keeping provider URL");
            source_url.to_string()
        }
    }
}

/// Materialize a provider-supplied thumbnail (always stored as JPEG).
pub async fn materialize_thumbnail(
    http: &reqwest::Client,
    store: Option<&ObjectStore>,
    user_id: RecordId,
    tool_folder: &str,
    source_url: &str,
    timestamp_ms: i64,
) -> String {
    let Some(store) = store else {
        return source_url.to_string();
    };

    let path = object_path(user_id, tool_folder, timestamp_ms, None, true, "jpg");

    match download(http, source_url).await {
        Ok(bytes) => match store.upload(&path, bytes, "image/jpeg").await {
            Ok(public_url) => public_url,
            Err(e) => {
                tracing::warn!(error = %e, source_url, "Thumbnail upload failed, keeping provider URL");
                source_url.to_string()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, source_url, "Thumbnail download failed, keeping provider URL");
            source_url.to_string()
        }
    }
}

async fn download(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, StorageError> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(StorageError::Api {
            status: status.as_u16(),
            body: String::new(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> RecordId {
        Uuid::parse_str("5f6c5aa8-14c2-4bb1-a1e4-5f1e35a0f0aa").unwrap()
    }

    #[test]
    fn object_path_single_output() {
        let path = object_path(user(), "wan-pro", 1_700_000_000_000, None, false, "mp4");
        assert_eq!(
            path,
            "5f6c5aa8-14c2-4bb1-a1e4-5f1e35a0f0aa/wan-pro/1700000000000.mp4"
        );
    }

    #[test]
    fn object_path_batch_index() {
        let path = object_path(
            user(),
            "flux-kontext-max-multi",
            1_700_000_000_000,
            Some(2),
            false,
            "png",
        );
        assert!(path.ends_with("/1700000000000_2.png"));
    }

    #[test]
    fn object_path_thumbnail_suffix() {
        let path = object_path(user(), "wan-pro", 1_700_000_000_000, None, true, "jpg");
        assert!(path.ends_with("/1700000000000_thumbnail.jpg"));
    }

    #[test]
    fn single_item_batch_stays_a_bare_url() {
        let urls = vec!["https://s/1.png".to_string()];
        assert_eq!(batch_output_value(&urls), "https://s/1.png");
    }

    #[test]
    fn multi_item_batch_becomes_a_json_array_string() {
        let urls = vec![
            "https://s/1.png".to_string(),
            "https://s/2.png".to_string(),
            "https://s/3.png".to_string(),
        ];
        let encoded = batch_output_value(&urls);
        let decoded: Vec<String> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded, urls);
    }

    #[test]
    fn store_requires_url_and_key() {
        let client = reqwest::Client::new();
        let config = StorageConfig {
            url: Some("https://storage.example.com/storage/v1".into()),
            service_key: None,
            bucket: "user-files".into(),
        };
        assert!(ObjectStore::from_config(client.clone(), &config).is_none());

        let config = StorageConfig {
            url: Some("https://storage.example.com/storage/v1/".into()),
            service_key: Some("service-key".into()),
            bucket: "user-files".into(),
        };
        let store = ObjectStore::from_config(client, &config).unwrap();
        assert_eq!(
            store.public_url("u/tool/1.mp4"),
            "https://storage.example.com/storage/v1/object/public/user-files/u/tool/1.mp4"
        );
    }
}
