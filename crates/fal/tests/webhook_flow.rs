//! End-to-end tests for the provider webhook wire path: sign a body the
//! way the provider does, verify it, parse the envelope, and resolve or
//! classify the payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use serde_json::json;
use sha2::{Digest, Sha256};
use vivid_fal::webhook::resolve_output;
use vivid_fal::{
    classify_webhook, signature, FalErrorType, Jwk, ResolvedOutput, SignatureHeaders,
    WebhookEnvelope, WebhookOutcome,
};

const NOW: i64 = 1_700_000_000;

fn provider_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

fn provider_jwks(key: &SigningKey) -> Vec<Jwk> {
    serde_json::from_value(json!([
        { "kty": "RSA" },
        {
            "kty": "OKP",
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(key.verifying_key().to_bytes()),
        }
    ]))
    .expect("JWKS key set parses")
}

/// Sign `body` exactly the way the provider does: Ed25519 over
/// `request_id \n user_id \n timestamp \n hex(sha256(body))`.
fn sign_delivery(key: &SigningKey, body: &[u8], timestamp: i64) -> SignatureHeaders {
    let request_id = "req-e2e";
    let user_id = "user-e2e";
    let body_hash = hex::encode(Sha256::digest(body));
    let message = format!("{request_id}\n{user_id}\n{timestamp}\n{body_hash}");
    let signature_hex = hex::encode(key.sign(message.as_bytes()).to_bytes());

    SignatureHeaders::new(
        Some(request_id),
        Some(user_id),
        Some(&timestamp.to_string()),
        Some(&signature_hex),
    )
    .expect("all headers present")
}

#[test]
fn signed_success_delivery_verifies_and_resolves() {
    let key = provider_key();
    let keys = provider_jwks(&key);

    let body = serde_json::to_vec(&json!({
        "request_id": "req-e2e",
        "status": "OK",
        "payload": {
            "video": {
                "url": "https://provider/out.mp4",
                "content_type": "video/mp4",
                "thumbnail": { "url": "https://provider/thumb.jpg" }
            },
            "seed": 1234
        }
    }))
    .unwrap();

    let headers = sign_delivery(&key, &body, NOW);
    assert!(signature::verify_signature(&headers, &body, &keys, NOW));

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope.correlation_id(), Some("req-e2e"));
    assert_eq!(envelope.outcome(), WebhookOutcome::Success);
    assert_eq!(envelope.seed(), Some(1234));

    let resolved = resolve_output(envelope.payload.as_ref()).unwrap();
    match resolved {
        ResolvedOutput::Video {
            url,
            content_type,
            thumbnail_url,
            ..
        } => {
            assert_eq!(url, "https://provider/out.mp4");
            assert_eq!(content_type.as_deref(), Some("video/mp4"));
            assert_eq!(thumbnail_url.as_deref(), Some("https://provider/thumb.jpg"));
        }
        other => panic!("expected video output, got {other:?}"),
    }
}

#[test]
fn tampering_with_one_byte_breaks_verification() {
    let key = provider_key();
    let keys = provider_jwks(&key);

    let body = serde_json::to_vec(&json!({
        "request_id": "req-e2e",
        "status": "OK",
        "payload": { "image": { "url": "https://provider/x.png" } }
    }))
    .unwrap();
    let headers = sign_delivery(&key, &body, NOW);
    assert!(signature::verify_signature(&headers, &body, &keys, NOW));

    // Flip one byte of the body after signing.
    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] ^= 0x01;
    assert!(!signature::verify_signature(&headers, &tampered, &keys, NOW));
}

#[test]
fn replayed_delivery_outside_window_is_rejected() {
    let key = provider_key();
    let keys = provider_jwks(&key);

    let body = br#"{"request_id":"req-e2e","status":"OK"}"#.to_vec();
    let headers = sign_delivery(&key, &body, NOW - 301);
    assert!(!signature::verify_signature(&headers, &body, &keys, NOW));
}

#[test]
fn multi_image_delivery_resolves_all_urls() {
    let body = json!({
        "request_id": "req-e2e",
        "status": "COMPLETED",
        "payload": {
            "images": [
                { "url": "https://provider/1.png" },
                { "url": "https://provider/2.png" },
                { "url": "https://provider/3.png" }
            ]
        }
    });
    let envelope: WebhookEnvelope = serde_json::from_value(body).unwrap();
    assert_eq!(envelope.outcome(), WebhookOutcome::Success);

    match resolve_output(envelope.payload.as_ref()).unwrap() {
        ResolvedOutput::ImageBatch { urls } => assert_eq!(urls.len(), 3),
        other => panic!("expected image batch, got {other:?}"),
    }
}

#[test]
fn cancelled_delivery_classifies_like_a_failure() {
    let body = json!({
        "request_id": "req-e2e",
        "status": "CANCELLED",
        "error": "job cancelled upstream"
    });
    let envelope: WebhookEnvelope = serde_json::from_value(body).unwrap();
    assert_eq!(envelope.outcome(), WebhookOutcome::Failure);

    let classified = classify_webhook(&envelope);
    assert_eq!(classified.error_type, FalErrorType::UnknownError);
    assert_eq!(classified.technical_message, "job cancelled upstream");
}

#[test]
fn nsfw_failure_upgrades_to_content_violation() {
    let body = json!({
        "request_id": "req-e2e",
        "status": "FAILED",
        "error": { "message": "prompt flagged as nsfw" }
    });
    let envelope: WebhookEnvelope = serde_json::from_value(body).unwrap();

    let classified = classify_webhook(&envelope);
    assert_eq!(classified.error_type, FalErrorType::ContentViolation);
    assert!(classified.user_message.contains("Content Policy Violation"));
}
