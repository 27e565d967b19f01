//! Reservation & settlement engine
//!
//! Owns the stock ledger, the order state machine, the expiry sweep and
//! the payment reconciler. All mutations flow through [`ReservationEngine`]
//! and commit as single redb write transactions; see `storage.rs` for the
//! concurrency discipline.
//!
//! # Reservation flow
//!
//! ```text
//! reserve_order(vendor, keyword, qty, phone)
//!     ├─ 1. Resolve vendor + keyword -> product (must be active)
//!     ├─ 2. Ledger.reserve (atomic check-and-increment)
//!     ├─ 3. Generate payment token (collision-checked, retried)
//!     ├─ 4. Insert order row (status = reserved) + reserved index
//!     └─ 5. Commit — failure anywhere rolls the whole hold back
//! ```

pub mod events;
pub mod expiry;
pub mod ledger;
pub mod reconciler;
pub mod storage;
pub mod token;

pub use events::{EngineEvent, OrderNotice};
pub use expiry::{ExpirationScheduler, SweepStats};
pub use reconciler::{PaymentEvent, PaymentEventOutcome, SettlementAck, SettlementOutcome};

use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{Order, OrderStatus, Product, ProductCreate, Vendor, VendorCreate};
use shared::util::{new_id, now_millis};
use thiserror::Error;
use tokio::sync::broadcast;

use ledger::LedgerError;
use storage::{EngineStorage, StorageError};

/// Attempts before giving up on payment token generation. With 256-bit
/// tokens a second attempt is already unheard of.
const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Default hold duration when a vendor does not configure one
pub const DEFAULT_RESERVATION_MINUTES: i64 = 10;

/// Upper bound on a vendor's reservation window (one week). Keeps the
/// `reservation_minutes * 60_000` deadline arithmetic well inside i64.
pub const MAX_RESERVATION_MINUTES: i64 = 7 * 24 * 60;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Vendor not found: {0}")]
    VendorNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product not sellable: {0}")]
    ProductInactive(String),

    #[error("Insufficient stock: requested {requested}, sellable {sellable}")]
    InsufficientStock { requested: u32, sellable: u32 },

    #[error("Keyword '{keyword}' already registered for vendor {vendor_id}")]
    KeywordExists { vendor_id: String, keyword: String },

    #[error("Stock {requested} below reserved quantity {reserved}")]
    StockBelowReserved { requested: u32, reserved: u32 },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order already settled as {status}")]
    OrderAlreadySettled { status: OrderStatus },

    #[error("Payment token not recognized")]
    UnknownPaymentToken,

    #[error("Payment token generation exhausted {MAX_TOKEN_ATTEMPTS} attempts")]
    TokenCollision,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ProductNotFound(id) => Self::ProductNotFound(id),
            LedgerError::InsufficientStock {
                requested,
                sellable,
            } => Self::InsufficientStock {
                requested,
                sellable,
            },
            LedgerError::StockBelowReserved {
                requested,
                reserved,
            } => Self::StockBelowReserved {
                requested,
                reserved,
            },
            LedgerError::Storage(e) => Self::Storage(e),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        let code = match &err {
            EngineError::VendorNotFound(_) => ErrorCode::VendorNotFound,
            EngineError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            EngineError::ProductInactive(_) => ErrorCode::ProductInactive,
            EngineError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            EngineError::KeywordExists { .. } => ErrorCode::KeywordExists,
            EngineError::StockBelowReserved { .. } => ErrorCode::StockBelowReserved,
            EngineError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::OrderAlreadySettled { .. } => ErrorCode::OrderAlreadySettled,
            EngineError::UnknownPaymentToken => ErrorCode::UnknownPaymentToken,
            EngineError::TokenCollision => ErrorCode::InternalError,
            EngineError::Validation(_) => ErrorCode::ValidationFailed,
            EngineError::Storage(e) => {
                tracing::error!(error = %e, "Engine storage error");
                return AppError::new(ErrorCode::DatabaseError);
            }
        };
        AppError::with_message(code, message)
    }
}

/// A reservation request from the chat collaborator
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReserveRequest {
    pub vendor_id: String,
    pub product_keyword: String,
    pub quantity: u32,
    pub buyer_phone: String,
}

/// What the buyer sees on `GET /pay/{token}` — a read-only projection
/// that leaks no vendor id, internal ids, or other buyers' data.
#[derive(Debug, Clone, Serialize)]
pub struct PayPageView {
    pub product_name: String,
    pub amount: i64,
    pub client_name: String,
    pub status: OrderStatus,
    /// Unix millis
    pub expires_at: i64,
    pub vendor_name: String,
}

/// The reservation & settlement engine
///
/// Handlers share one instance behind an `Arc` in `AppState`.
pub struct ReservationEngine {
    pub(super) storage: EngineStorage,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl ReservationEngine {
    /// Open the engine with its database at the given path
    pub fn new(db_path: impl AsRef<std::path::Path>) -> EngineResult<Self> {
        let storage = EngineStorage::open(db_path)?;
        Ok(Self {
            storage,
            event_tx: events::channel(),
        })
    }

    /// Create an engine with existing storage (for testing)
    #[cfg(test)]
    pub fn with_storage(storage: EngineStorage) -> Self {
        Self {
            storage,
            event_tx: events::channel(),
        }
    }

    /// Subscribe to settlement/expiry notifications
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub(super) fn emit(&self, event: EngineEvent) {
        // No receivers is fine: the chat collaborator may not be attached
        // (e.g. during tests or batch runs).
        let _ = self.event_tx.send(event);
    }

    // ========== Vendor / Product Provisioning ==========

    /// Register a vendor
    pub fn create_vendor(&self, payload: VendorCreate) -> EngineResult<Vendor> {
        if payload.name.trim().is_empty() {
            return Err(EngineError::Validation("vendor name is required".into()));
        }
        let minutes = payload
            .reservation_minutes
            .unwrap_or(DEFAULT_RESERVATION_MINUTES);
        if !(1..=MAX_RESERVATION_MINUTES).contains(&minutes) {
            return Err(EngineError::Validation(format!(
                "reservation_minutes must be between 1 and {MAX_RESERVATION_MINUTES}"
            )));
        }

        let vendor = Vendor {
            id: new_id(),
            name: payload.name.trim().to_string(),
            reservation_minutes: minutes,
            created_at: now_millis(),
        };

        let txn = self.storage.begin_write()?;
        self.storage.put_vendor(&txn, &vendor)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(vendor_id = %vendor.id, name = %vendor.name, "Vendor registered");
        Ok(vendor)
    }

    /// Get a vendor by id
    pub fn get_vendor(&self, vendor_id: &str) -> EngineResult<Vendor> {
        self.storage
            .get_vendor(vendor_id)?
            .ok_or_else(|| EngineError::VendorNotFound(vendor_id.to_string()))
    }

    /// Register a product under a vendor
    ///
    /// The keyword is unique per vendor, matched case-insensitively.
    pub fn create_product(&self, payload: ProductCreate) -> EngineResult<Product> {
        if payload.name.trim().is_empty() {
            return Err(EngineError::Validation("product name is required".into()));
        }
        let keyword = payload.keyword.trim().to_string();
        if keyword.is_empty() || keyword.contains(char::is_whitespace) {
            return Err(EngineError::Validation(
                "keyword must be a single non-empty word".into(),
            ));
        }
        if payload.price <= 0 {
            return Err(EngineError::Validation("price must be positive".into()));
        }

        let txn = self.storage.begin_write()?;
        if self.storage.get_vendor_txn(&txn, &payload.vendor_id)?.is_none() {
            return Err(EngineError::VendorNotFound(payload.vendor_id));
        }

        let product = Product {
            id: new_id(),
            vendor_id: payload.vendor_id,
            name: payload.name.trim().to_string(),
            keyword,
            price: payload.price,
            stock: payload.stock,
            reserved_stock: 0,
            is_active: true,
            created_at: now_millis(),
        };

        if !self.storage.insert_keyword(
            &txn,
            &product.vendor_id,
            &product.keyword,
            &product.id,
        )? {
            return Err(EngineError::KeywordExists {
                vendor_id: product.vendor_id,
                keyword: product.keyword,
            });
        }
        self.storage.put_product(&txn, &product)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            product_id = %product.id,
            vendor_id = %product.vendor_id,
            keyword = %product.keyword,
            stock = product.stock,
            "Product registered"
        );
        Ok(product)
    }

    /// Get a product by id
    pub fn get_product(&self, product_id: &str) -> EngineResult<Product> {
        self.storage
            .get_product(product_id)?
            .ok_or_else(|| EngineError::ProductNotFound(product_id.to_string()))
    }

    /// Vendor restock: set a product's total stock
    pub fn set_stock(&self, product_id: &str, new_stock: u32) -> EngineResult<Product> {
        let txn = self.storage.begin_write()?;
        let product = ledger::set_stock(&txn, product_id, new_stock)?;
        txn.commit().map_err(StorageError::from)?;
        tracing::info!(
            product_id = %product.id,
            stock = product.stock,
            reserved = product.reserved_stock,
            "Stock adjusted"
        );
        Ok(product)
    }

    // ========== Reservation Service ==========

    /// Reserve stock for a buyer: the chat collaborator's entry point
    ///
    /// Exactly one ledger reservation and one order row per successful
    /// call; on any failure the transaction aborts and no hold remains.
    pub fn reserve_order(&self, req: ReserveRequest) -> EngineResult<Order> {
        if req.quantity < 1 {
            return Err(EngineError::Validation(
                "quantity must be at least 1".into(),
            ));
        }
        if req.buyer_phone.trim().is_empty() {
            return Err(EngineError::Validation("buyer_phone is required".into()));
        }

        let txn = self.storage.begin_write()?;

        let vendor = self
            .storage
            .get_vendor_txn(&txn, &req.vendor_id)?
            .ok_or_else(|| EngineError::VendorNotFound(req.vendor_id.clone()))?;
        let product_id = self
            .storage
            .resolve_keyword_txn(&txn, &req.vendor_id, &req.product_keyword)?
            .ok_or_else(|| EngineError::ProductNotFound(req.product_keyword.clone()))?;
        let product = self
            .storage
            .get_product_txn(&txn, &product_id)?
            .ok_or_else(|| EngineError::ProductNotFound(product_id.clone()))?;
        if !product.is_active {
            return Err(EngineError::ProductInactive(product.keyword));
        }
        let total_amount = product
            .price
            .checked_mul(req.quantity as i64)
            .ok_or_else(|| EngineError::Validation("order total exceeds the amount range".into()))?;

        // Atomic check-and-increment; losers of the race fail here with
        // no side effects.
        ledger::reserve(&txn, &product.id, req.quantity)?;

        let order_id = new_id();
        let payment_token = self.issue_token(&txn, &order_id)?;

        let count = self.storage.next_order_count(&txn)?;
        let date = chrono::Utc::now().format("%Y%m%d");
        let reference = format!("SOUK{}-{}", date, 10000 + count);

        let reserved_at = now_millis();
        let order = Order {
            id: order_id,
            reference,
            vendor_id: vendor.id.clone(),
            product_id: product.id.clone(),
            buyer_phone: req.buyer_phone.trim().to_string(),
            quantity: req.quantity,
            unit_price: product.price,
            total_amount,
            status: OrderStatus::Reserved,
            payment_token,
            reserved_at,
            expires_at: reserved_at + vendor.reservation_minutes * 60_000,
            paid_at: None,
        };

        self.storage.put_order(&txn, &order)?;
        self.storage.mark_reserved(&txn, &order.id)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            order_id = %order.id,
            reference = %order.reference,
            product_id = %product.id,
            quantity = order.quantity,
            amount = order.total_amount,
            expires_at = order.expires_at,
            "Stock reserved"
        );
        Ok(order)
    }

    /// Generate a payment token unique across all orders
    fn issue_token(
        &self,
        txn: &redb::WriteTransaction,
        order_id: &str,
    ) -> EngineResult<String> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let candidate = token::generate();
            if self.storage.insert_token(txn, &candidate, order_id)? {
                return Ok(candidate);
            }
            tracing::warn!("Payment token collision, regenerating");
        }
        Err(EngineError::TokenCollision)
    }

    // ========== Order Queries / Cancellation ==========

    /// Get an order by id
    pub fn get_order(&self, order_id: &str) -> EngineResult<Order> {
        self.storage
            .get_order(order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))
    }

    /// Explicit buyer/vendor cancellation: CAS `reserved -> cancelled`
    /// and release the held stock, in one transaction.
    pub fn cancel_order(&self, order_id: &str) -> EngineResult<Order> {
        let txn = self.storage.begin_write()?;
        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        if order.status.is_terminal() {
            // Lost the race against payment or expiry; expected, not an anomaly.
            return Err(EngineError::OrderAlreadySettled {
                status: order.status,
            });
        }
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(EngineError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        order.status = OrderStatus::Cancelled;
        ledger::release(&txn, &order.product_id, order.quantity)?;
        self.storage.put_order(&txn, &order)?;
        self.storage.unmark_reserved(&txn, &order.id)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(order_id = %order.id, reference = %order.reference, "Order cancelled");
        Ok(order)
    }

    // ========== Public Payment Page ==========

    /// Read-only projection for the public payment page
    pub fn pay_page(&self, payment_token: &str) -> EngineResult<PayPageView> {
        let order_id = self
            .storage
            .get_order_id_by_token(payment_token)?
            .ok_or(EngineError::UnknownPaymentToken)?;
        let order = self
            .storage
            .get_order(&order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.clone()))?;
        let product_name = self
            .storage
            .get_product(&order.product_id)?
            .map(|p| p.name)
            .unwrap_or_default();
        let vendor_name = self
            .storage
            .get_vendor(&order.vendor_id)?
            .map(|v| v.name)
            .unwrap_or_default();

        Ok(PayPageView {
            product_name,
            amount: order.total_amount,
            client_name: order.buyer_phone,
            status: order.status,
            expires_at: order.expires_at,
            vendor_name,
        })
    }
}
