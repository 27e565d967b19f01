//! API routes for souk-server

pub mod catalog;
pub mod health;
pub mod orders;
pub mod pay;
pub mod payment_webhook;
pub mod reserve;

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Router, middleware};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::rate_limit::pay_page_rate_limit;
use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Vendor-facing catalog management
    let catalog = Router::new()
        .route("/api/vendors", post(catalog::create_vendor))
        .route("/api/vendors/{id}", get(catalog::get_vendor))
        .route("/api/products", post(catalog::create_product))
        .route("/api/products/{id}", get(catalog::get_product))
        .route("/api/products/{id}/stock", put(catalog::set_stock));

    // Order lifecycle (reserve, inspect, cancel)
    let orders = Router::new()
        .route("/api/reserve", post(reserve::reserve))
        .route("/api/orders/{id}", get(orders::get_order))
        .route("/api/orders/{id}/cancel", post(orders::cancel_order));

    // Buyer pay page (rate limited, token is the only credential)
    let pay = Router::new()
        .route("/pay/{token}", get(pay::pay_page))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            pay_page_rate_limit,
        ));

    // Provider webhook (signature-verified, raw body)
    let webhook = Router::new().route(
        "/payments/webhook",
        post(payment_webhook::handle_webhook),
    );

    Router::new()
        .route("/health", get(health::health_check))
        .merge(catalog)
        .merge(orders)
        .merge(pay)
        .merge(webhook)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .with_state(state)
}
