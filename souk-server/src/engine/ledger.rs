//! Stock ledger — the only mutator of `stock` / `reserved_stock`
//!
//! Every operation runs inside the caller's write transaction, so the
//! check-and-increment is atomic with respect to all concurrent callers:
//! redb serializes write transactions, and a transaction that fails
//! commits nothing. Callers never read-modify-write the counters
//! themselves.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`reserve`] | `reserved += qty` iff `stock - reserved >= qty` |
//! | [`release`] | `reserved -= qty` (floored at 0, underflow logged) |
//! | [`commit_sale`] | `stock -= qty; reserved -= qty` (payment success only) |
//! | [`set_stock`] | vendor restock; rejected below `reserved` |

use redb::{ReadableTable, WriteTransaction};
use shared::models::Product;
use thiserror::Error;

use super::storage::{PRODUCTS_TABLE, StorageError};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock: requested {requested}, sellable {sellable}")]
    InsufficientStock { requested: u32, sellable: u32 },

    #[error("Stock {requested} below reserved quantity {reserved}")]
    StockBelowReserved { requested: u32, reserved: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

fn load(txn: &WriteTransaction, product_id: &str) -> LedgerResult<Product> {
    let table = txn.open_table(PRODUCTS_TABLE).map_err(StorageError::from)?;
    let guard = table
        .get(product_id)
        .map_err(StorageError::from)?
        .ok_or_else(|| LedgerError::ProductNotFound(product_id.to_string()))?;
    Ok(serde_json::from_slice(guard.value()).map_err(StorageError::from)?)
}

fn store(txn: &WriteTransaction, product: &Product) -> LedgerResult<()> {
    let mut table = txn.open_table(PRODUCTS_TABLE).map_err(StorageError::from)?;
    let value = serde_json::to_vec(product).map_err(StorageError::from)?;
    table
        .insert(product.id.as_str(), value.as_slice())
        .map_err(StorageError::from)?;
    Ok(())
}

/// Hold `quantity` units: `reserved_stock += quantity` iff sellable covers it.
///
/// Fails without side effects otherwise — two concurrent requests for the
/// last unit are serialized by the write transaction, so only one sees
/// enough sellable stock.
pub fn reserve(txn: &WriteTransaction, product_id: &str, quantity: u32) -> LedgerResult<Product> {
    let mut product = load(txn, product_id)?;
    let sellable = product.sellable();
    if sellable < quantity {
        return Err(LedgerError::InsufficientStock {
            requested: quantity,
            sellable,
        });
    }
    product.reserved_stock += quantity;
    store(txn, &product)?;
    Ok(product)
}

/// Return `quantity` held units to the pool: `reserved_stock -= quantity`.
///
/// Release-exactly-once per order is the caller's responsibility (the CAS
/// transition out of `reserved` arbitrates who releases). An underflow
/// here means that discipline was broken; it is floored and logged as an
/// anomaly rather than corrupting the counter.
pub fn release(txn: &WriteTransaction, product_id: &str, quantity: u32) -> LedgerResult<Product> {
    let mut product = load(txn, product_id)?;
    if product.reserved_stock < quantity {
        tracing::error!(
            product_id = %product_id,
            reserved = product.reserved_stock,
            quantity,
            "Ledger release underflow, flooring at 0"
        );
    }
    product.reserved_stock = product.reserved_stock.saturating_sub(quantity);
    store(txn, &product)?;
    Ok(product)
}

/// Permanently remove `quantity` units from the pool on payment success:
/// `stock -= quantity; reserved_stock -= quantity`.
///
/// This is the only operation that reduces total `stock`.
pub fn commit_sale(
    txn: &WriteTransaction,
    product_id: &str,
    quantity: u32,
) -> LedgerResult<Product> {
    let mut product = load(txn, product_id)?;
    if product.reserved_stock < quantity || product.stock < quantity {
        tracing::error!(
            product_id = %product_id,
            stock = product.stock,
            reserved = product.reserved_stock,
            quantity,
            "Ledger commit underflow, flooring at 0"
        );
    }
    product.stock = product.stock.saturating_sub(quantity);
    product.reserved_stock = product.reserved_stock.saturating_sub(quantity);
    store(txn, &product)?;
    Ok(product)
}

/// Vendor restock/adjustment: set total `stock` to a new value.
///
/// Rejected when the new total would drop below units currently held by
/// unsettled orders (`0 <= reserved_stock <= stock` must keep holding).
pub fn set_stock(txn: &WriteTransaction, product_id: &str, new_stock: u32) -> LedgerResult<Product> {
    let mut product = load(txn, product_id)?;
    if new_stock < product.reserved_stock {
        return Err(LedgerError::StockBelowReserved {
            requested: new_stock,
            reserved: product.reserved_stock,
        });
    }
    product.stock = new_stock;
    store(txn, &product)?;
    Ok(product)
}
