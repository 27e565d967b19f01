//! Engine event broadcast
//!
//! The engine emits an event whenever an order settles (`paid`) or its
//! hold is reclaimed (`expired`). The external message-template
//! collaborator subscribes and turns these into buyer/vendor chat
//! messages; formatting and delivery live outside the engine.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast channel capacity. Subscribers that lag beyond this many
/// undelivered events start losing the oldest ones.
pub const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Notification payload shared by all order events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderNotice {
    pub order_id: String,
    pub reference: String,
    pub vendor_id: String,
    pub product_name: String,
    pub total_amount: i64,
    pub buyer_phone: String,
}

/// Events emitted by the engine after a state change has committed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    /// Payment confirmed, stock permanently deducted
    OrderPaid(OrderNotice),
    /// Hold elapsed, stock released back to the pool
    OrderExpired(OrderNotice),
}

/// Create the engine event channel
pub fn channel() -> broadcast::Sender<EngineEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
