//! Catalog REST API — vendor and product management
//!
//! Stock writes go through the engine so the reserved floor is always
//! enforced; there is no raw stock column update anywhere else.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use shared::error::AppError;
use shared::models::{Product, ProductCreate, Vendor, VendorCreate};

use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

/// POST /api/vendors
pub async fn create_vendor(
    State(state): State<AppState>,
    Json(payload): Json<VendorCreate>,
) -> ApiResult<Vendor> {
    let vendor = state.with_engine(move |e| e.create_vendor(payload)).await?;
    Ok(Json(vendor))
}

/// GET /api/vendors/{id}
pub async fn get_vendor(
    State(state): State<AppState>,
    Path(vendor_id): Path<String>,
) -> ApiResult<Vendor> {
    let vendor = state
        .with_engine(move |e| e.get_vendor(&vendor_id))
        .await?;
    Ok(Json(vendor))
}

/// POST /api/products
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<ProductCreate>,
) -> ApiResult<Product> {
    let product = state
        .with_engine(move |e| e.create_product(payload))
        .await?;
    Ok(Json(product))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> ApiResult<Product> {
    let product = state
        .with_engine(move |e| e.get_product(&product_id))
        .await?;
    Ok(Json(product))
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: u32,
}

/// PUT /api/products/{id}/stock
pub async fn set_stock(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Json(payload): Json<SetStockRequest>,
) -> ApiResult<Product> {
    let product = state
        .with_engine(move |e| e.set_stock(&product_id, payload.stock))
        .await?;
    Ok(Json(product))
}
