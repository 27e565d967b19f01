//! Expiration sweep — reclaims unpaid holds
//!
//! The hold deadline is a wall-clock value stored on the order, not a
//! scheduled callback: after a restart the next tick naturally picks up
//! overdue orders. The scheduler is a single recurring task, so ticks
//! never overlap; a slow sweep just delays the next tick.
//!
//! Per order the sweep does status-transition-first, release-second,
//! inside one transaction: stock is released only when this sweep is the
//! actor that moved the order out of `reserved`. An order that settled
//! or was cancelled concurrently is skipped with no release.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use shared::models::OrderStatus;
use shared::util::now_millis;

use super::events::{EngineEvent, OrderNotice};
use super::storage::StorageError;
use super::{EngineResult, ReservationEngine, ledger};

/// Outcome of one sweep tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Reserved orders inspected
    pub examined: usize,
    /// Orders this sweep moved to `expired` (stock released for each)
    pub expired: usize,
    /// Orders that left `reserved` concurrently (no release performed)
    pub skipped: usize,
}

impl ReservationEngine {
    /// Expire every reserved order whose deadline has passed
    ///
    /// Callable directly (tests, admin tooling); the scheduler calls it
    /// on every tick.
    pub fn expire_due(&self, now: i64) -> EngineResult<SweepStats> {
        let mut stats = SweepStats::default();
        let mut notices = Vec::new();

        for order_id in self.storage.reserved_order_ids()? {
            stats.examined += 1;

            let txn = self.storage.begin_write()?;
            let Some(mut order) = self.storage.get_order_txn(&txn, &order_id)? else {
                tracing::error!(order_id = %order_id, "Reserved index points at missing order");
                continue;
            };

            // CAS guard: only the actor that finds the order still
            // reserved performs the transition and the release.
            if order.status != OrderStatus::Reserved {
                tracing::debug!(
                    order_id = %order.id,
                    status = %order.status,
                    "Order left reserved concurrently, cleaning index"
                );
                self.storage.unmark_reserved(&txn, &order.id)?;
                txn.commit().map_err(StorageError::from)?;
                stats.skipped += 1;
                continue;
            }
            if order.expires_at > now {
                continue;
            }

            order.status = OrderStatus::Expired;
            ledger::release(&txn, &order.product_id, order.quantity)?;
            self.storage.put_order(&txn, &order)?;
            self.storage.unmark_reserved(&txn, &order.id)?;
            txn.commit().map_err(StorageError::from)?;
            stats.expired += 1;

            tracing::info!(
                order_id = %order.id,
                reference = %order.reference,
                quantity = order.quantity,
                "Reservation expired, stock released"
            );

            let product_name = self
                .storage
                .get_product(&order.product_id)?
                .map(|p| p.name)
                .unwrap_or_default();
            notices.push(OrderNotice {
                order_id: order.id.clone(),
                reference: order.reference.clone(),
                vendor_id: order.vendor_id.clone(),
                product_name,
                total_amount: order.total_amount,
                buyer_phone: order.buyer_phone.clone(),
            });
        }

        // Broadcast only after the transitions are durable
        for notice in notices {
            self.emit(EngineEvent::OrderExpired(notice));
        }
        Ok(stats)
    }
}

/// Recurring expiration sweep
///
/// Registered as a `Periodic` background task. The first tick fires
/// immediately, which doubles as the restart catch-up: overdue holds are
/// reclaimed as soon as the service is back.
pub struct ExpirationScheduler {
    engine: Arc<ReservationEngine>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ExpirationScheduler {
    pub fn new(
        engine: Arc<ReservationEngine>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            interval,
            shutdown,
        }
    }

    /// Main loop: sweep every interval until shutdown
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Expiration scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        // A tick that runs long must not cause a burst of catch-up ticks
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Expiration scheduler received shutdown signal");
                    return;
                }
            }

            let engine = self.engine.clone();
            // redb transactions block; keep them off the async workers
            let result = tokio::task::spawn_blocking(move || engine.expire_due(now_millis())).await;

            match result {
                Ok(Ok(stats)) if stats.expired > 0 || stats.skipped > 0 => {
                    tracing::info!(
                        examined = stats.examined,
                        expired = stats.expired,
                        skipped = stats.skipped,
                        "Expiration sweep finished"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Expiration sweep failed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Expiration sweep task panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReserveRequest;
    use crate::engine::tests::{seed, test_engine};

    #[test]
    fn test_sweep_expires_due_orders_once() {
        let engine = test_engine();
        let (vendor, product) = seed(&engine, 2, 1);

        let order = engine
            .reserve_order(ReserveRequest {
                vendor_id: vendor.id.clone(),
                product_keyword: "kente".into(),
                quantity: 1,
                buyer_phone: "+237650000001".into(),
            })
            .unwrap();

        // not yet due
        let stats = engine.expire_due(order.expires_at - 1).unwrap();
        assert_eq!(stats, SweepStats { examined: 1, expired: 0, skipped: 0 });
        assert_eq!(
            engine.get_order(&order.id).unwrap().status,
            OrderStatus::Reserved
        );

        // due: exactly one release
        let stats = engine.expire_due(order.expires_at).unwrap();
        assert_eq!(stats.expired, 1);
        let p = engine.get_product(&product.id).unwrap();
        assert_eq!(p.reserved_stock, 0);
        assert_eq!(p.stock, 2);
        assert_eq!(
            engine.get_order(&order.id).unwrap().status,
            OrderStatus::Expired
        );

        // a repeated sweep sees an empty index; nothing double-releases
        let stats = engine.expire_due(order.expires_at + 60_000).unwrap();
        assert_eq!(stats, SweepStats::default());
        let p = engine.get_product(&product.id).unwrap();
        assert_eq!(p.reserved_stock, 0);
        assert_eq!(p.stock, 2);
    }

    #[test]
    fn test_sweep_skips_cancelled_orders() {
        let engine = test_engine();
        let (vendor, product) = seed(&engine, 1, 1);

        let order = engine
            .reserve_order(ReserveRequest {
                vendor_id: vendor.id.clone(),
                product_keyword: "kente".into(),
                quantity: 1,
                buyer_phone: "+237650000001".into(),
            })
            .unwrap();
        engine.cancel_order(&order.id).unwrap();

        // cancel already released and cleaned the index
        let stats = engine.expire_due(order.expires_at + 1).unwrap();
        assert_eq!(stats, SweepStats::default());
        assert_eq!(engine.get_product(&product.id).unwrap().reserved_stock, 0);
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let engine = Arc::new(test_engine());
        let shutdown = CancellationToken::new();
        let scheduler = ExpirationScheduler::new(
            engine,
            Duration::from_millis(10),
            shutdown.clone(),
        );

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler must stop on shutdown")
            .unwrap();
    }
}
