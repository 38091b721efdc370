//! Webhook signature verification.
//!
//! Provider webhooks are signed with Ed25519 over a canonical message
//! derived from four request headers and the SHA-256 of the exact raw
//! body bytes. Public keys come from the provider's JWKS document,
//! cached for 24 hours. Verification is a pure function over
//! (headers, body, keys, now) so tests control time and key material;
//! the cache is owned by the caller, not this module.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Header names the provider signs.
pub const HEADER_REQUEST_ID: &str = "x-fal-webhook-request-id";
pub const HEADER_USER_ID: &str = "x-fal-webhook-user-id";
pub const HEADER_TIMESTAMP: &str = "x-fal-webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "x-fal-webhook-signature";

/// Maximum allowed clock skew between the signed timestamp and now.
pub const REPLAY_WINDOW_SECS: i64 = 300;

/// How long a fetched JWKS document stays fresh.
pub const JWKS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// The four signature headers, all required.
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    pub request_id: String,
    pub user_id: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignatureHeaders {
    /// Assemble from raw header values; `None` when any is absent.
    pub fn new(
        request_id: Option<&str>,
        user_id: Option<&str>,
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Option<Self> {
        Some(Self {
            request_id: request_id?.to_string(),
            user_id: user_id?.to_string(),
            timestamp: timestamp?.to_string(),
            signature: signature?.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// JWKS
// ---------------------------------------------------------------------------

/// A single key from the provider's JWKS document. Only Ed25519 OKP
/// keys are usable; others are skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub crv: String,
    #[serde(default)]
    pub x: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

/// Caller-owned cache of the provider key set.
#[derive(Debug, Default)]
pub struct JwksCache {
    keys: Vec<Jwk>,
    fetched_at: Option<Instant>,
}

impl JwksCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached keys, if fetched within the TTL.
    pub fn fresh_keys(&self, now: Instant) -> Option<&[Jwk]> {
        let fetched_at = self.fetched_at?;
        if now.duration_since(fetched_at) < JWKS_TTL {
            Some(&self.keys)
        } else {
            None
        }
    }

    /// Replace the cached key set.
    pub fn store(&mut self, keys: Vec<Jwk>, now: Instant) {
        self.keys = keys;
        self.fetched_at = Some(now);
    }
}

/// Fetches the JWKS document over HTTP.
pub struct JwksClient {
    client: reqwest::Client,
    url: String,
}

impl JwksClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    /// Fetch the current key set from the provider.
    pub async fn fetch(&self) -> Result<Vec<Jwk>, crate::client::FalApiError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(crate::client::FalApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let document: JwksDocument = response.json().await?;
        Ok(document.keys)
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a webhook delivery against the provider key set.
///
/// Returns `false` on any defect: unparsable or stale timestamp,
/// malformed signature hex, or no key verifying the canonical message.
pub fn verify_signature(
    headers: &SignatureHeaders,
    body: &[u8],
    keys: &[Jwk],
    now_unix: i64,
) -> bool {
    let Ok(timestamp) = headers.timestamp.parse::<i64>() else {
        return false;
    };
    if (now_unix - timestamp).abs() > REPLAY_WINDOW_SECS {
        return false;
    }

    let message = canonical_message(headers, body);

    let Ok(signature_bytes) = hex::decode(&headers.signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };

    for key in keys {
        if key.kty != "OKP" || key.crv != "Ed25519" {
            continue;
        }
        let Some(x) = &key.x else { continue };
        let Ok(public_bytes) = URL_SAFE_NO_PAD.decode(x.trim_end_matches('=')) else {
            continue;
        };
        let Ok(public_array) = <[u8; 32]>::try_from(public_bytes.as_slice()) else {
            continue;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&public_array) else {
            continue;
        };
        if verifying_key
            .verify_strict(message.as_bytes(), &signature)
            .is_ok()
        {
            return true;
        }
    }
    false
}

/// `request_id \n user_id \n timestamp \n hex(sha256(body))`.
fn canonical_message(headers: &SignatureHeaders, body: &[u8]) -> String {
    let body_hash = hex::encode(Sha256::digest(body));
    format!(
        "{}\n{}\n{}\n{}",
        headers.request_id, headers.user_id, headers.timestamp, body_hash
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    const NOW: i64 = 1_700_000_000;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn jwk_for(key: &SigningKey) -> Jwk {
        Jwk {
            kty: "OKP".into(),
            crv: "Ed25519".into(),
            x: Some(URL_SAFE_NO_PAD.encode(key.verifying_key().to_bytes())),
        }
    }

    fn signed_headers(key: &SigningKey, body: &[u8], timestamp: i64) -> SignatureHeaders {
        let mut headers = SignatureHeaders {
            request_id: "req-123".into(),
            user_id: "user-abc".into(),
            timestamp: timestamp.to_string(),
            signature: String::new(),
        };
        let message = canonical_message(&headers, body);
        headers.signature = hex::encode(key.sign(message.as_bytes()).to_bytes());
        headers
    }

    #[test]
    fn valid_signature_verifies() {
        let key = test_key();
        let body = br#"{"request_id":"req-123","status":"OK"}"#;
        let headers = signed_headers(&key, body, NOW);
        assert!(verify_signature(&headers, body, &[jwk_for(&key)], NOW));
    }

    #[test]
    fn tampered_body_fails() {
        let key = test_key();
        let body = br#"{"request_id":"req-123","status":"OK"}"#;
        let headers = signed_headers(&key, body, NOW);
        let tampered = br#"{"request_id":"req-123","status":"OK"}x"#;
        assert!(!verify_signature(&headers, tampered, &[jwk_for(&key)], NOW));
    }

    #[test]
    fn stale_timestamp_fails_even_with_valid_signature() {
        let key = test_key();
        let body = b"{}";
        let headers = signed_headers(&key, body, NOW - 301);
        assert!(!verify_signature(&headers, body, &[jwk_for(&key)], NOW));

        // Just inside the window still verifies.
        let headers = signed_headers(&key, body, NOW - 299);
        assert!(verify_signature(&headers, body, &[jwk_for(&key)], NOW));
    }

    #[test]
    fn future_timestamp_outside_window_fails() {
        let key = test_key();
        let body = b"{}";
        let headers = signed_headers(&key, body, NOW + 301);
        assert!(!verify_signature(&headers, body, &[jwk_for(&key)], NOW));
    }

    #[test]
    fn non_integer_timestamp_fails() {
        let key = test_key();
        let body = b"{}";
        let mut headers = signed_headers(&key, body, NOW);
        headers.timestamp = "not-a-number".into();
        assert!(!verify_signature(&headers, body, &[jwk_for(&key)], NOW));
    }

    #[test]
    fn malformed_signature_hex_fails() {
        let key = test_key();
        let body = b"{}";
        let mut headers = signed_headers(&key, body, NOW);
        headers.signature = "zz-not-hex".into();
        assert!(!verify_signature(&headers, body, &[jwk_for(&key)], NOW));
    }

    #[test]
    fn wrong_key_fails_but_matching_key_in_set_passes() {
        let signing = test_key();
        let other = SigningKey::from_bytes(&[9u8; 32]);
        let body = b"{}";
        let headers = signed_headers(&signing, body, NOW);

        assert!(!verify_signature(&headers, body, &[jwk_for(&other)], NOW));
        // First matching key wins even after non-matching candidates.
        assert!(verify_signature(
            &headers,
            body,
            &[jwk_for(&other), jwk_for(&signing)],
            NOW
        ));
    }

    #[test]
    fn non_ed25519_keys_are_skipped() {
        let key = test_key();
        let body = b"{}";
        let headers = signed_headers(&key, body, NOW);
        let rsa_key = Jwk {
            kty: "RSA".into(),
            crv: String::new(),
            x: None,
        };
        assert!(!verify_signature(&headers, body, &[rsa_key], NOW));
    }

    #[test]
    fn headers_require_all_four_values() {
        assert!(SignatureHeaders::new(Some("r"), Some("u"), Some("1"), Some("s")).is_some());
        assert!(SignatureHeaders::new(None, Some("u"), Some("1"), Some("s")).is_none());
        assert!(SignatureHeaders::new(Some("r"), Some("u"), None, Some("s")).is_none());
    }

    #[test]
    fn jwks_cache_expires() {
        let mut cache = JwksCache::new();
        let now = Instant::now();
        assert!(cache.fresh_keys(now).is_none());

        cache.store(vec![jwk_for(&test_key())], now);
        assert!(cache.fresh_keys(now).is_some());
        assert!(cache
            .fresh_keys(now + JWKS_TTL - Duration::from_secs(1))
            .is_some());
        assert!(cache.fresh_keys(now + JWKS_TTL).is_none());
    }
}
