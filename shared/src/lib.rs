//! Shared types for the souk engine
//!
//! Common types used by the engine server and external collaborators
//! (chat parser, dashboard): domain models, error codes, response
//! structures and small utilities.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCode};
pub use models::{Order, OrderStatus, Product, Vendor};
