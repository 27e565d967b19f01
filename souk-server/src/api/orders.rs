//! Order inspection and cancellation

use axum::Json;
use axum::extract::{Path, State};

use shared::error::AppError;
use shared::models::Order;

use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state.with_engine(move |e| e.get_order(&order_id)).await?;
    Ok(Json(order))
}

/// POST /api/orders/{id}/cancel
///
/// Vendor-initiated cancellation. Only reserved orders can be
/// cancelled; the held stock goes back to sellable in the same
/// transaction as the status flip.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state
        .with_engine(move |e| e.cancel_order(&order_id))
        .await?;
    tracing::info!(order_id = %order.id, "Order cancelled");
    Ok(Json(order))
}
