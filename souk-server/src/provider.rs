//! Payment provider integration
//!
//! The engine never talks to the provider; charges are executed
//! externally and the provider calls back over a signed webhook. This
//! module owns the provider trust boundary: signature verification and
//! decoding of the callback payload.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::engine::{PaymentEvent, PaymentEventOutcome};

/// Maximum accepted age of a webhook event (replay protection)
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Raw webhook body as sent by the provider
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub token: String,
    pub provider_ref: String,
    pub amount: i64,
    pub outcome: PaymentEventOutcome,
    pub idempotency_key: String,
}

impl From<WebhookPayload> for PaymentEvent {
    fn from(p: WebhookPayload) -> Self {
        PaymentEvent {
            token: p.token,
            provider_ref: p.provider_ref,
            amount: p.amount,
            outcome: p.outcome,
            idempotency_key: p.idempotency_key,
        }
    }
}

/// Verify the webhook signature header (HMAC-SHA256)
///
/// Header format: `t=<unix seconds>,v1=<hex hmac>` where the MAC covers
/// `"{t}.{raw body}"`. Events older than [`MAX_EVENT_AGE_SECS`] are
/// rejected to prevent replay.
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("Invalid signature header");
    }

    let signed_payload = format!("{timestamp}.{}", std::str::from_utf8(payload).unwrap_or(""));
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(signed_payload.as_bytes());

    // Decode hex signature and use constant-time comparison via hmac::verify_slice
    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")?;

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).abs() > MAX_EVENT_AGE_SECS {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}

/// Build a signature header for a payload (used by tests and local tooling)
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signed_payload = format!("{timestamp}.{}", std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(signed_payload.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"token":"abc","amount":5000}"#;
        let header = sign_payload(body, SECRET, chrono::Utc::now().timestamp());
        assert!(verify_webhook_signature(body, &header, SECRET).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = br#"{"token":"abc","amount":5000}"#;
        let header = sign_payload(body, SECRET, chrono::Utc::now().timestamp());
        let tampered = br#"{"token":"abc","amount":9999}"#;
        assert_eq!(
            verify_webhook_signature(tampered, &header, SECRET),
            Err("Webhook signature mismatch")
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"{}";
        let header = sign_payload(body, SECRET, chrono::Utc::now().timestamp());
        assert!(verify_webhook_signature(body, &header, "other-secret").is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"{}";
        let old = chrono::Utc::now().timestamp() - MAX_EVENT_AGE_SECS - 10;
        let header = sign_payload(body, SECRET, old);
        assert_eq!(
            verify_webhook_signature(body, &header, SECRET),
            Err("Webhook timestamp too old")
        );
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_webhook_signature(b"{}", "v1=abcd", SECRET).is_err());
        assert!(verify_webhook_signature(b"{}", "t=123", SECRET).is_err());
        assert!(verify_webhook_signature(b"{}", "", SECRET).is_err());
    }
}
