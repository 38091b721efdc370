//! Client and wire types for the FAL generation provider.
//!
//! Covers the four surfaces the platform touches: queue submission
//! (plus the legacy status/result polling endpoints), the signed
//! webhook envelope, JWKS-based signature verification, and the
//! provider error classifier.

pub mod classify;
pub mod client;
pub mod signature;
pub mod webhook;

pub use classify::{classify_submission, classify_webhook, ClassifiedError, FalErrorType};
pub use client::{FalApiError, FalClient, QueueSubmitResponse};
pub use signature::{Jwk, JwksCache, JwksClient, SignatureHeaders};
pub use webhook::{ResolvedOutput, WebhookEnvelope, WebhookOutcome};
