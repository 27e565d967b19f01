//! Payment provider webhook handler
//!
//! POST /payments/webhook — must receive the raw body (not JSON) so
//! the HMAC signature can be verified over the exact bytes sent.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use shared::error::{AppError, ErrorCode};

use crate::engine::{PaymentEvent, SettlementAck, SettlementOutcome};
use crate::provider::{self, WebhookPayload};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Handle an incoming provider payment event
///
/// Replays of an already-processed delivery return the recorded outcome
/// with `duplicate_delivery` set, so the provider stops retrying.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<SettlementAck>), AppError> {
    let sig_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing {SIGNATURE_HEADER} header");
            AppError::new(ErrorCode::WebhookUnauthenticated)
        })?;

    if let Err(e) = provider::verify_webhook_signature(&body, sig_header, &state.webhook_secret) {
        tracing::warn!(error = e, "Webhook signature verification failed");
        return Err(AppError::with_message(ErrorCode::WebhookUnauthenticated, e));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(%e, "Failed to parse webhook payload");
        AppError::invalid_request(format!("Malformed webhook payload: {e}"))
    })?;

    let event = PaymentEvent::from(payload);
    tracing::info!(
        idempotency_key = %event.idempotency_key,
        provider_ref = %event.provider_ref,
        "Received payment event"
    );

    let ack = state
        .with_engine(move |e| e.handle_payment_event(event))
        .await?;

    // The provider only needs to know whether to stop retrying; a 2xx
    // acknowledges receipt even for late or failed payments. Amount
    // mismatches stay non-2xx so they surface in provider dashboards.
    let status = match ack.outcome {
        SettlementOutcome::AmountMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    Ok((status, Json(ack)))
}
