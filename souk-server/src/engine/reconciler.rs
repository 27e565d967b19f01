//! Payment reconciler — consumes provider callbacks and settles orders
//!
//! Signature verification happens at the HTTP boundary (raw body +
//! signature header); by the time an event reaches [`ReservationEngine::
//! handle_payment_event`] it is authenticated but may still be a
//! duplicate, mismatched, or too late.
//!
//! Everything — idempotency check, status CAS, ledger commit, outcome
//! record — happens in one write transaction, so a webhook retry racing
//! the expiry sweep observes either the world before or after this
//! event, never a half-applied one.

use serde::{Deserialize, Serialize};
use shared::models::OrderStatus;
use shared::util::now_millis;

use super::storage::WebhookRecord;
use super::{EngineError, EngineResult, ReservationEngine, ledger};
use crate::engine::events::{EngineEvent, OrderNotice};

/// Provider-reported result of the charge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEventOutcome {
    Success,
    Failure,
}

/// A verified payment event, decoded from the provider webhook
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    /// The order's payment token (public handle)
    pub token: String,
    /// Provider-side transaction reference
    pub provider_ref: String,
    /// Amount charged, FCFA
    pub amount: i64,
    pub outcome: PaymentEventOutcome,
    /// Provider event id; repeated deliveries share it
    pub idempotency_key: String,
}

/// How the engine settled a payment event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementOutcome {
    /// Order transitioned to `paid`, stock committed
    Confirmed,
    /// No-op: the order was already paid (provider retry with a fresh
    /// event id, or a second channel confirming the same charge)
    Duplicate,
    /// Event amount differs from the order total; not finalized
    AmountMismatch,
    /// Payment succeeded after the hold was reclaimed; needs manual
    /// reconciliation, the engine never auto-refunds
    LateOrPaidElsewhere,
    /// Provider reported the charge failed; order left reserved
    FailureRecorded,
}

/// Acknowledgement returned to the webhook endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SettlementAck {
    pub outcome: SettlementOutcome,
    pub order_id: String,
    /// True when this delivery replayed a previously recorded result
    pub duplicate_delivery: bool,
}

impl ReservationEngine {
    /// Process a verified payment event
    ///
    /// Idempotent: redelivering an event with a known idempotency key
    /// returns the recorded outcome without mutating anything.
    pub fn handle_payment_event(&self, event: PaymentEvent) -> EngineResult<SettlementAck> {
        let txn = self.storage.begin_write()?;

        // Replay check first: a known key short-circuits before any mutation
        if let Some(record) = self
            .storage
            .get_webhook_record_txn(&txn, &event.idempotency_key)?
        {
            tracing::info!(
                idempotency_key = %event.idempotency_key,
                outcome = ?record.outcome,
                "Duplicate webhook delivery, replaying recorded outcome"
            );
            return Ok(SettlementAck {
                outcome: record.outcome,
                order_id: record.order_id,
                duplicate_delivery: true,
            });
        }

        let order_id = self
            .storage
            .get_order_id_by_token_txn(&txn, &event.token)?
            .ok_or(EngineError::UnknownPaymentToken)?;
        let mut order = self
            .storage
            .get_order_txn(&txn, &order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.clone()))?;

        let outcome = match event.outcome {
            PaymentEventOutcome::Failure => {
                // Charge failed at the provider; the hold stands until it
                // expires or the buyer retries payment.
                SettlementOutcome::FailureRecorded
            }
            PaymentEventOutcome::Success if event.amount != order.total_amount => {
                tracing::warn!(
                    order_id = %order.id,
                    expected = order.total_amount,
                    received = event.amount,
                    provider_ref = %event.provider_ref,
                    "Payment amount mismatch, not finalizing"
                );
                SettlementOutcome::AmountMismatch
            }
            PaymentEventOutcome::Success => match order.status {
                // CAS reserved -> paid; the write transaction serializes us
                // against the expiry sweep and cancellation.
                OrderStatus::Reserved => {
                    order.status = OrderStatus::Paid;
                    order.paid_at = Some(now_millis());
                    ledger::commit_sale(&txn, &order.product_id, order.quantity)?;
                    self.storage.put_order(&txn, &order)?;
                    self.storage.unmark_reserved(&txn, &order.id)?;
                    SettlementOutcome::Confirmed
                }
                OrderStatus::Paid => SettlementOutcome::Duplicate,
                OrderStatus::Expired | OrderStatus::Cancelled => {
                    tracing::warn!(
                        order_id = %order.id,
                        status = %order.status,
                        provider_ref = %event.provider_ref,
                        "Payment confirmed after hold was reclaimed, flagging for manual reconciliation"
                    );
                    SettlementOutcome::LateOrPaidElsewhere
                }
                OrderStatus::Pending => {
                    // Unreachable through the public flow; a pending order
                    // has no stock held and must not settle.
                    return Err(EngineError::InvalidTransition {
                        from: OrderStatus::Pending,
                        to: OrderStatus::Paid,
                    });
                }
            },
        };

        let record = WebhookRecord {
            provider_ref: event.provider_ref.clone(),
            order_id: order.id.clone(),
            outcome,
            amount: event.amount,
            received_at: now_millis(),
        };
        self.storage
            .put_webhook_record(&txn, &event.idempotency_key, &record)?;
        txn.commit().map_err(super::storage::StorageError::from)?;

        if outcome == SettlementOutcome::Confirmed {
            tracing::info!(
                order_id = %order.id,
                reference = %order.reference,
                amount = order.total_amount,
                provider_ref = %event.provider_ref,
                "Order paid"
            );
            let product_name = self
                .storage
                .get_product(&order.product_id)?
                .map(|p| p.name)
                .unwrap_or_default();
            self.emit(EngineEvent::OrderPaid(OrderNotice {
                order_id: order.id.clone(),
                reference: order.reference.clone(),
                vendor_id: order.vendor_id.clone(),
                product_name,
                total_amount: order.total_amount,
                buyer_phone: order.buyer_phone.clone(),
            }));
        }

        Ok(SettlementAck {
            outcome,
            order_id: order.id,
            duplicate_delivery: false,
        })
    }
}
