//! redb-based storage for the reservation engine
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `vendors` | `vendor_id` | `Vendor` | Vendor registry |
//! | `products` | `product_id` | `Product` | Products + authoritative stock counters |
//! | `keywords` | `(vendor_id, keyword)` | `product_id` | Case-insensitive keyword resolution |
//! | `orders` | `order_id` | `Order` | Order rows |
//! | `reserved_orders` | `order_id` | `()` | Index scanned by the expiry sweep |
//! | `payment_tokens` | `token` | `order_id` | Token uniqueness + pay-page lookup |
//! | `webhook_events` | `idempotency_key` | `WebhookRecord` | Processed payment events |
//! | `sequence_counter` | key | `u64` | Daily order counter for reference numbers |
//!
//! # Concurrency discipline
//!
//! redb admits a single write transaction at a time, so every ledger or
//! order mutation composed inside one transaction is atomic with respect
//! to all concurrent callers. This is what implements the engine's
//! check-and-increment and compare-and-set guarantees: a transaction
//! reads the current counters/status and either commits the whole
//! mutation or leaves no trace.
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate` by default: once `commit()`
//! returns the hold is on disk, and the expiry sweep can pick overdue
//! orders back up after a process restart.

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use shared::models::{Order, Product, Vendor};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Vendors: key = vendor_id, value = JSON-serialized Vendor
const VENDORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vendors");

/// Products: key = product_id, value = JSON-serialized Product
pub(super) const PRODUCTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("products");

/// Keyword index: key = (vendor_id, lowercased keyword), value = product_id
const KEYWORDS_TABLE: TableDefinition<(&str, &str), &str> = TableDefinition::new("keywords");

/// Orders: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Reserved-order index: key = order_id, value = empty (existence check)
const RESERVED_ORDERS_TABLE: TableDefinition<&str, ()> = TableDefinition::new("reserved_orders");

/// Payment tokens: key = token, value = order_id
const TOKENS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("payment_tokens");

/// Processed payment events: key = idempotency key, value = JSON-serialized WebhookRecord
const WEBHOOK_EVENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("webhook_events");

/// Counters: key = "order_count" / "order_date", value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const ORDER_COUNT_KEY: &str = "order_count";
const ORDER_DATE_KEY: &str = "order_date";

/// Recorded outcome of a processed payment event, replayed verbatim on
/// duplicate deliveries of the same idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub provider_ref: String,
    pub order_id: String,
    pub outcome: super::reconciler::SettlementOutcome,
    pub amount: i64,
    /// Processing time (Unix millis)
    pub received_at: i64,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Engine storage backed by redb
#[derive(Clone)]
pub struct EngineStorage {
    db: Arc<Database>,
}

impl EngineStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Create all tables so later read transactions never hit a missing table
    fn init_tables(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(VENDORS_TABLE)?;
            let _ = write_txn.open_table(PRODUCTS_TABLE)?;
            let _ = write_txn.open_table(KEYWORDS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(RESERVED_ORDERS_TABLE)?;
            let _ = write_txn.open_table(TOKENS_TABLE)?;
            let _ = write_txn.open_table(WEBHOOK_EVENTS_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(ORDER_COUNT_KEY)?.is_none() {
                seq_table.insert(ORDER_COUNT_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Vendor Operations ==========

    /// Insert or update a vendor (within transaction)
    pub fn put_vendor(&self, txn: &WriteTransaction, vendor: &Vendor) -> StorageResult<()> {
        let mut table = txn.open_table(VENDORS_TABLE)?;
        let value = serde_json::to_vec(vendor)?;
        table.insert(vendor.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get a vendor by id
    pub fn get_vendor(&self, vendor_id: &str) -> StorageResult<Option<Vendor>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VENDORS_TABLE)?;
        match table.get(vendor_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get a vendor by id (within transaction)
    pub fn get_vendor_txn(
        &self,
        txn: &WriteTransaction,
        vendor_id: &str,
    ) -> StorageResult<Option<Vendor>> {
        let table = txn.open_table(VENDORS_TABLE)?;
        match table.get(vendor_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    // ========== Product Operations ==========

    /// Insert or update a product (within transaction)
    ///
    /// Counter mutations must go through the stock ledger; this is the
    /// write-back half of those operations.
    pub fn put_product(&self, txn: &WriteTransaction, product: &Product) -> StorageResult<()> {
        let mut table = txn.open_table(PRODUCTS_TABLE)?;
        let value = serde_json::to_vec(product)?;
        table.insert(product.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get a product by id
    pub fn get_product(&self, product_id: &str) -> StorageResult<Option<Product>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS_TABLE)?;
        match table.get(product_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get a product by id (within transaction)
    pub fn get_product_txn(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
    ) -> StorageResult<Option<Product>> {
        let table = txn.open_table(PRODUCTS_TABLE)?;
        match table.get(product_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Register a keyword for a product (within transaction)
    ///
    /// Returns `false` without overwriting when the keyword is already
    /// taken by this vendor.
    pub fn insert_keyword(
        &self,
        txn: &WriteTransaction,
        vendor_id: &str,
        keyword: &str,
        product_id: &str,
    ) -> StorageResult<bool> {
        let lowered = keyword.to_lowercase();
        let mut table = txn.open_table(KEYWORDS_TABLE)?;
        if table.get((vendor_id, lowered.as_str()))?.is_some() {
            return Ok(false);
        }
        table.insert((vendor_id, lowered.as_str()), product_id)?;
        Ok(true)
    }

    /// Resolve a keyword to a product id (within transaction)
    pub fn resolve_keyword_txn(
        &self,
        txn: &WriteTransaction,
        vendor_id: &str,
        keyword: &str,
    ) -> StorageResult<Option<String>> {
        let lowered = keyword.to_lowercase();
        let table = txn.open_table(KEYWORDS_TABLE)?;
        Ok(table
            .get((vendor_id, lowered.as_str()))?
            .map(|g| g.value().to_string()))
    }

    // ========== Order Operations ==========

    /// Insert or update an order (within transaction)
    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        table.insert(order.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get an order by id
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order by id (within transaction)
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Add an order to the reserved index (within transaction)
    pub fn mark_reserved(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<()> {
        let mut table = txn.open_table(RESERVED_ORDERS_TABLE)?;
        table.insert(order_id, ())?;
        Ok(())
    }

    /// Remove an order from the reserved index (within transaction)
    pub fn unmark_reserved(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<()> {
        let mut table = txn.open_table(RESERVED_ORDERS_TABLE)?;
        table.remove(order_id)?;
        Ok(())
    }

    /// Ids of all orders currently in the reserved index
    ///
    /// The expiry sweep scans this instead of the full order history.
    pub fn reserved_order_ids(&self) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RESERVED_ORDERS_TABLE)?;
        let mut ids = Vec::new();
        for result in table.iter()? {
            let (key, _value) = result?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    // ========== Payment Token Operations ==========

    /// Register a payment token (within transaction)
    ///
    /// Returns `false` without overwriting if the token already exists;
    /// the caller regenerates and retries.
    pub fn insert_token(
        &self,
        txn: &WriteTransaction,
        token: &str,
        order_id: &str,
    ) -> StorageResult<bool> {
        let mut table = txn.open_table(TOKENS_TABLE)?;
        if table.get(token)?.is_some() {
            return Ok(false);
        }
        table.insert(token, order_id)?;
        Ok(true)
    }

    /// Resolve a payment token to an order id
    pub fn get_order_id_by_token(&self, token: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKENS_TABLE)?;
        Ok(table.get(token)?.map(|g| g.value().to_string()))
    }

    /// Resolve a payment token to an order id (within transaction)
    pub fn get_order_id_by_token_txn(
        &self,
        txn: &WriteTransaction,
        token: &str,
    ) -> StorageResult<Option<String>> {
        let table = txn.open_table(TOKENS_TABLE)?;
        Ok(table.get(token)?.map(|g| g.value().to_string()))
    }

    // ========== Webhook Idempotency ==========

    /// Look up a processed payment event by idempotency key (within transaction)
    pub fn get_webhook_record_txn(
        &self,
        txn: &WriteTransaction,
        idempotency_key: &str,
    ) -> StorageResult<Option<WebhookRecord>> {
        let table = txn.open_table(WEBHOOK_EVENTS_TABLE)?;
        match table.get(idempotency_key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Record a processed payment event (within transaction)
    ///
    /// The outcome is stored before the transaction commits, so the ack
    /// sent to the provider is always backed by a durable record.
    pub fn put_webhook_record(
        &self,
        txn: &WriteTransaction,
        idempotency_key: &str,
        record: &WebhookRecord,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(WEBHOOK_EVENTS_TABLE)?;
        let value = serde_json::to_vec(record)?;
        table.insert(idempotency_key, value.as_slice())?;
        Ok(())
    }

    // ========== Order Counter (for reference numbers) ==========

    /// Increment and return the daily order count (within transaction)
    ///
    /// The counter resets when the UTC date changes; the date is stored
    /// alongside it so the reset survives restarts.
    pub fn next_order_count(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        let today: u64 = chrono::Utc::now()
            .format("%Y%m%d")
            .to_string()
            .parse()
            .unwrap_or(0);

        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let stored_date = table.get(ORDER_DATE_KEY)?.map(|g| g.value()).unwrap_or(0);

        let next = if stored_date != today {
            table.insert(ORDER_DATE_KEY, today)?;
            1
        } else {
            let current = table.get(ORDER_COUNT_KEY)?.map(|g| g.value()).unwrap_or(0);
            current + 1
        };
        table.insert(ORDER_COUNT_KEY, next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::OrderStatus;
    use shared::util::{new_id, now_millis};

    fn sample_order(id: &str, token: &str) -> Order {
        Order {
            id: id.to_string(),
            reference: "SOUK20260829-10001".to_string(),
            vendor_id: new_id(),
            product_id: new_id(),
            buyer_phone: "+237650000001".to_string(),
            quantity: 1,
            unit_price: 5000,
            total_amount: 5000,
            status: OrderStatus::Reserved,
            payment_token: token.to_string(),
            reserved_at: now_millis(),
            expires_at: now_millis() + 600_000,
            paid_at: None,
        }
    }

    #[test]
    fn test_order_roundtrip() {
        let storage = EngineStorage::open_in_memory().unwrap();
        let order = sample_order("o1", "tok-1");

        let txn = storage.begin_write().unwrap();
        storage.put_order(&txn, &order).unwrap();
        storage.mark_reserved(&txn, &order.id).unwrap();
        txn.commit().unwrap();

        let loaded = storage.get_order("o1").unwrap().unwrap();
        assert_eq!(loaded.reference, order.reference);
        assert_eq!(loaded.status, OrderStatus::Reserved);
        assert_eq!(storage.reserved_order_ids().unwrap(), vec!["o1".to_string()]);
    }

    #[test]
    fn test_token_insert_rejects_collision() {
        let storage = EngineStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        assert!(storage.insert_token(&txn, "tok", "o1").unwrap());
        assert!(!storage.insert_token(&txn, "tok", "o2").unwrap());
        txn.commit().unwrap();

        // first registration wins
        assert_eq!(
            storage.get_order_id_by_token("tok").unwrap(),
            Some("o1".to_string())
        );
    }

    #[test]
    fn test_keyword_case_insensitive() {
        let storage = EngineStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        assert!(storage.insert_keyword(&txn, "v1", "Wax", "p1").unwrap());
        assert!(!storage.insert_keyword(&txn, "v1", "WAX", "p2").unwrap());
        assert_eq!(
            storage.resolve_keyword_txn(&txn, "v1", "wAx").unwrap(),
            Some("p1".to_string())
        );
        // same keyword under another vendor is fine
        assert!(storage.insert_keyword(&txn, "v2", "wax", "p3").unwrap());
        txn.commit().unwrap();
    }

    #[test]
    fn test_order_counter_increments() {
        let storage = EngineStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        let a = storage.next_order_count(&txn).unwrap();
        let b = storage.next_order_count(&txn).unwrap();
        txn.commit().unwrap();
        assert_eq!(b, a + 1);
    }
}
