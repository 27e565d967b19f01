//! Unified error codes for the souk engine
//!
//! Error codes are shared between the engine server, the chat collaborator
//! and the dashboard so that every surface maps failures the same way.
//! Codes are organized by category:
//! - 0xxx: General errors
//! - 3xxx: Vendor errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 3xxx: Vendor ====================
    /// Vendor not found
    VendorNotFound = 3001,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Status transition not permitted from the order's current status
    InvalidTransition = 4002,
    /// Order is already in a terminal status
    OrderAlreadySettled = 4003,

    // ==================== 5xxx: Payment ====================
    /// Payment event amount does not match the order total
    AmountMismatch = 5001,
    /// Webhook signature missing or unverifiable
    WebhookUnauthenticated = 5002,
    /// Payment confirmed after the hold was already reclaimed
    LateOrPaidElsewhere = 5003,
    /// Payment token not recognized
    UnknownPaymentToken = 5004,

    // ==================== 6xxx: Product ====================
    /// Product not found for the given keyword or id
    ProductNotFound = 6001,
    /// Product exists but is not currently sellable
    ProductInactive = 6002,
    /// Not enough sellable stock to cover the requested quantity
    InsufficientStock = 6003,
    /// Keyword already registered for this vendor
    KeywordExists = 6004,
    /// Stock adjustment below currently reserved quantity
    StockBelowReserved = 6005,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database/storage error
    DatabaseError = 9002,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the default message for this error code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",

            Self::VendorNotFound => "Vendor not found",

            Self::OrderNotFound => "Order not found",
            Self::InvalidTransition => "Status transition not permitted",
            Self::OrderAlreadySettled => "Order already settled",

            Self::AmountMismatch => "Payment amount does not match order total",
            Self::WebhookUnauthenticated => "Webhook signature missing or invalid",
            Self::LateOrPaidElsewhere => "Payment arrived after the hold was reclaimed",
            Self::UnknownPaymentToken => "Payment token not recognized",

            Self::ProductNotFound => "Product not found",
            Self::ProductInactive => "Product is not currently sellable",
            Self::InsufficientStock => "Not enough stock available",
            Self::KeywordExists => "Keyword already registered for this vendor",
            Self::StockBelowReserved => "Stock cannot be set below reserved quantity",

            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.code(), self.message())
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code as u16
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::ValidationFailed),
            3 => Ok(Self::NotFound),
            4 => Ok(Self::AlreadyExists),
            5 => Ok(Self::InvalidRequest),
            3001 => Ok(Self::VendorNotFound),
            4001 => Ok(Self::OrderNotFound),
            4002 => Ok(Self::InvalidTransition),
            4003 => Ok(Self::OrderAlreadySettled),
            5001 => Ok(Self::AmountMismatch),
            5002 => Ok(Self::WebhookUnauthenticated),
            5003 => Ok(Self::LateOrPaidElsewhere),
            5004 => Ok(Self::UnknownPaymentToken),
            6001 => Ok(Self::ProductNotFound),
            6002 => Ok(Self::ProductInactive),
            6003 => Ok(Self::InsufficientStock),
            6004 => Ok(Self::KeywordExists),
            6005 => Ok(Self::StockBelowReserved),
            9001 => Ok(Self::InternalError),
            9002 => Ok(Self::DatabaseError),
            _ => Err(format!("Unknown error code: {value}")),
        }
    }
}
