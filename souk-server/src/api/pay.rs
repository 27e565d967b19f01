//! Buyer pay page
//!
//! GET /pay/{token} — the only surface a buyer ever touches. The token
//! is the sole credential, so the projection is deliberately narrow and
//! the route sits behind a per-IP rate limit.

use axum::Json;
use axum::extract::{Path, State};

use shared::error::AppError;

use crate::engine::PayPageView;
use crate::state::AppState;

/// GET /pay/{token}
pub async fn pay_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PayPageView>, AppError> {
    let view = state.with_engine(move |e| e.pay_page(&token)).await?;
    Ok(Json(view))
}
