//! HMAC-SHA256 signing and verification of webhook bodies.
//!
//! Signatures always cover the exact bytes sent on the wire. A payload is
//! serialized once into a [`SignedPayload`] and every attempt reuses those
//! bytes, so the signature a subscriber sees never depends on how a JSON
//! object happens to be re-serialized.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;
use crate::models::WebhookPayload;

/// Prefix of the `X-Webhook-Signature` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
pub fn compute_hmac_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Produce the header value `sha256=<hex>` for `body`.
pub fn sign(body: &[u8], secret: &str) -> String {
    format!("{SIGNATURE_PREFIX}{}", compute_hmac_signature(secret, body))
}

/// Verify a `sha256=<hex>` signature over the raw transmitted body.
///
/// Signatures of the wrong length are rejected before any byte comparison.
pub fn verify_signature(raw_body: &str, signature: &str, secret: &str) -> bool {
    let expected = sign(raw_body.as_bytes(), secret);
    constant_time_eq(signature.as_bytes(), expected.as_bytes())
}

/// Constant-time byte comparison; unequal lengths return early.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// A payload frozen into its wire bytes together with their signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    event: String,
    body: Vec<u8>,
    signature: String,
}

impl SignedPayload {
    /// Serialize `payload` once and sign the resulting bytes.
    pub fn seal(payload: &WebhookPayload, secret: &str) -> Result<Self, WebhookError> {
        let body = serde_json::to_vec(payload)?;
        let signature = sign(&body, secret);
        Ok(Self {
            event: payload.event.clone(),
            body,
            signature,
        })
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}
