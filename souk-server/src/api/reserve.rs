//! Reservation endpoint
//!
//! POST /api/reserve — called by the chat collaborator when a buyer
//! sends a product keyword. On success the response carries the pay
//! URL fragment the collaborator pastes back into the conversation.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use shared::error::AppError;
use shared::models::{Order, OrderStatus};

use crate::engine::ReserveRequest;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub order_id: String,
    pub reference: String,
    pub status: OrderStatus,
    pub total_amount: i64,
    /// Unix millis
    pub expires_at: i64,
    pub payment_token: String,
    /// Path of the buyer pay page, relative to the public host
    pub pay_url: String,
}

impl From<Order> for ReserveResponse {
    fn from(order: Order) -> Self {
        let pay_url = format!("/pay/{}", order.payment_token);
        Self {
            order_id: order.id,
            reference: order.reference,
            status: order.status,
            total_amount: order.total_amount,
            expires_at: order.expires_at,
            payment_token: order.payment_token,
            pay_url,
        }
    }
}

/// POST /api/reserve
pub async fn reserve(
    State(state): State<AppState>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, AppError> {
    let order = state.with_engine(move |e| e.reserve_order(req)).await?;
    tracing::info!(
        order_id = %order.id,
        reference = %order.reference,
        "Reservation created"
    );
    Ok(Json(order.into()))
}
