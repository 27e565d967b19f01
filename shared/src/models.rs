//! Domain models for the reservation & settlement engine
//!
//! These types are shared with the external collaborators (chat parser,
//! dashboard) and are the shapes persisted by the engine. All monetary
//! amounts are plain integers: FCFA has no minor currency unit.

use serde::{Deserialize, Serialize};

// ============================================================================
// Vendor
// ============================================================================

/// A vendor selling limited-stock items through a chat channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    /// How long a reservation holds stock before the expiry sweep reclaims it
    pub reservation_minutes: i64,
    /// Creation time (Unix millis)
    pub created_at: i64,
}

/// Create vendor payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorCreate {
    pub name: String,
    /// Defaults to 10 minutes when omitted
    pub reservation_minutes: Option<i64>,
}

// ============================================================================
// Product
// ============================================================================

/// Product entity with the authoritative stock counters
///
/// Invariant: `0 <= reserved_stock <= stock` at all times. The sellable
/// quantity shown to buyers is `stock - reserved_stock`. Only the stock
/// ledger mutates these two counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub vendor_id: String,
    pub name: String,
    /// Chat keyword, unique per vendor, matched case-insensitively
    pub keyword: String,
    /// Unit price in FCFA (positive integer, no subunit)
    pub price: i64,
    /// Total owned units
    pub stock: u32,
    /// Units currently held by unsettled orders
    pub reserved_stock: u32,
    pub is_active: bool,
    /// Creation time (Unix millis)
    pub created_at: i64,
}

impl Product {
    /// Units currently available for new reservations
    pub fn sellable(&self) -> u32 {
        self.stock.saturating_sub(self.reserved_stock)
    }
}

/// Create product payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreate {
    pub vendor_id: String,
    pub name: String,
    pub keyword: String,
    pub price: i64,
    pub stock: u32,
}

// ============================================================================
// Order
// ============================================================================

/// Order lifecycle status
///
/// ```text
/// pending ──reserve──► reserved ──payment success──► paid      [terminal]
///                         │
///                         ├──expiration sweep──────► expired   [terminal]
///                         └──explicit cancel───────► cancelled [terminal]
/// ```
///
/// Every transition is compare-and-set on the current status; terminal
/// statuses never transition again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Transient pre-state (product resolved, stock not yet held)
    Pending,
    /// Stock held, awaiting payment
    Reserved,
    /// Payment confirmed, stock permanently deducted
    Paid,
    /// Hold elapsed, stock released by the expiry sweep
    Expired,
    /// Explicitly cancelled by buyer or vendor, stock released
    Cancelled,
}

impl OrderStatus {
    /// Whether this status permits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Expired | Self::Cancelled)
    }

    /// Whether a transition from `self` to `next` is permitted
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Reserved)
                | (Self::Reserved, Self::Paid)
                | (Self::Reserved, Self::Expired)
                | (Self::Reserved, Self::Cancelled)
        )
    }

    /// Lowercase name used in logs and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reserved => "reserved",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Human-readable reference number (e.g. `SOUK20260829-10001`)
    pub reference: String,
    pub vendor_id: String,
    pub product_id: String,
    pub buyer_phone: String,
    pub quantity: u32,
    /// Unit price captured at reservation time
    pub unit_price: i64,
    /// `unit_price * quantity`
    pub total_amount: i64,
    pub status: OrderStatus,
    /// Opaque random token, the public handle for the payment page.
    /// Never derivable from the order or product id.
    pub payment_token: String,
    /// Reservation time (Unix millis)
    pub reserved_at: i64,
    /// Hold deadline (Unix millis); always set while `status = reserved`
    pub expires_at: i64,
    /// Settlement time (Unix millis); set on the paid transition only
    pub paid_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sellable_never_underflows() {
        let p = Product {
            id: "p".into(),
            vendor_id: "v".into(),
            name: "Wax print".into(),
            keyword: "wax".into(),
            price: 5000,
            stock: 2,
            reserved_stock: 2,
            is_active: true,
            created_at: 0,
        };
        assert_eq!(p.sellable(), 0);
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(Paid));
        assert!(Reserved.can_transition_to(Expired));
        assert!(Reserved.can_transition_to(Cancelled));

        // terminal statuses never move again
        for terminal in [Paid, Expired, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Reserved, Paid, Expired, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        // no shortcut from pending to a terminal status
        assert!(!Pending.can_transition_to(Paid));
        assert!(!Pending.can_transition_to(Expired));
    }
}
