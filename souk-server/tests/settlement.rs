//! Payment settlement: idempotency, amount mismatch, late payments,
//! and the pay/expire race.

use std::sync::Arc;

use shared::models::{OrderStatus, Product, ProductCreate, VendorCreate};
use souk_server::engine::{
    PaymentEvent, PaymentEventOutcome, ReservationEngine, ReserveRequest, SettlementOutcome,
};

struct Fixture {
    _dir: tempfile::TempDir,
    engine: Arc<ReservationEngine>,
    vendor_id: String,
    product_id: String,
}

fn setup(stock: u32, price: i64) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(ReservationEngine::new(dir.path().join("souk.redb")).unwrap());
    let vendor = engine
        .create_vendor(VendorCreate {
            name: "Chez Awa".into(),
            reservation_minutes: Some(10),
        })
        .unwrap();
    let product = engine
        .create_product(ProductCreate {
            vendor_id: vendor.id.clone(),
            name: "Shea butter 500g".into(),
            keyword: "shea".into(),
            price,
            stock,
        })
        .unwrap();
    Fixture {
        _dir: dir,
        engine,
        vendor_id: vendor.id,
        product_id: product.id,
    }
}

fn reserve(f: &Fixture, quantity: u32) -> shared::models::Order {
    f.engine
        .reserve_order(ReserveRequest {
            vendor_id: f.vendor_id.clone(),
            product_keyword: "shea".into(),
            quantity,
            buyer_phone: "+221771234567".into(),
        })
        .unwrap()
}

fn payment_event(order: &shared::models::Order, key: &str) -> PaymentEvent {
    PaymentEvent {
        token: order.payment_token.clone(),
        provider_ref: format!("ch_{key}"),
        amount: order.total_amount,
        outcome: PaymentEventOutcome::Success,
        idempotency_key: key.to_string(),
    }
}

fn product(f: &Fixture) -> Product {
    f.engine.get_product(&f.product_id).unwrap()
}

#[test]
fn successful_payment_commits_stock_once() {
    let f = setup(10, 4_000);
    let order = reserve(&f, 2);
    let mut events = f.engine.subscribe();

    let ack = f
        .engine
        .handle_payment_event(payment_event(&order, "evt_1"))
        .unwrap();
    assert_eq!(ack.outcome, SettlementOutcome::Confirmed);
    assert!(!ack.duplicate_delivery);

    let order = f.engine.get_order(&order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());

    // Committed: both counters dropped by the order quantity
    let p = product(&f);
    assert_eq!(p.stock, 8);
    assert_eq!(p.reserved_stock, 0);
    assert_eq!(p.sellable(), 8);

    // The paid notice went out after the commit
    match events.try_recv().unwrap() {
        souk_server::engine::EngineEvent::OrderPaid(notice) => {
            assert_eq!(notice.order_id, order.id);
            assert_eq!(notice.total_amount, order.total_amount);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn redelivery_replays_recorded_outcome() {
    let f = setup(10, 4_000);
    let order = reserve(&f, 2);

    let first = f
        .engine
        .handle_payment_event(payment_event(&order, "evt_1"))
        .unwrap();
    let second = f
        .engine
        .handle_payment_event(payment_event(&order, "evt_1"))
        .unwrap();

    assert_eq!(first.outcome, SettlementOutcome::Confirmed);
    assert_eq!(second.outcome, SettlementOutcome::Confirmed);
    assert!(second.duplicate_delivery);

    // Accounting happened exactly once
    let p = product(&f);
    assert_eq!(p.stock, 8);
    assert_eq!(p.reserved_stock, 0);
}

#[test]
fn fresh_event_for_paid_order_is_duplicate_noop() {
    let f = setup(10, 4_000);
    let order = reserve(&f, 1);

    f.engine
        .handle_payment_event(payment_event(&order, "evt_1"))
        .unwrap();
    // Same charge confirmed again under a new provider event id
    let ack = f
        .engine
        .handle_payment_event(payment_event(&order, "evt_2"))
        .unwrap();

    assert_eq!(ack.outcome, SettlementOutcome::Duplicate);
    assert!(!ack.duplicate_delivery);

    let p = product(&f);
    assert_eq!(p.stock, 9);
    assert_eq!(p.reserved_stock, 0);
}

#[test]
fn amount_mismatch_never_finalizes() {
    let f = setup(10, 4_000);
    let order = reserve(&f, 2);

    let mut event = payment_event(&order, "evt_1");
    event.amount = order.total_amount - 500;
    let ack = f.engine.handle_payment_event(event).unwrap();

    assert_eq!(ack.outcome, SettlementOutcome::AmountMismatch);

    // Order untouched, hold intact
    let order = f.engine.get_order(&order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Reserved);
    let p = product(&f);
    assert_eq!(p.stock, 10);
    assert_eq!(p.reserved_stock, 2);
}

#[test]
fn failure_event_leaves_hold_in_place() {
    let f = setup(10, 4_000);
    let order = reserve(&f, 1);

    let mut event = payment_event(&order, "evt_1");
    event.outcome = PaymentEventOutcome::Failure;
    let ack = f.engine.handle_payment_event(event).unwrap();

    assert_eq!(ack.outcome, SettlementOutcome::FailureRecorded);

    // Buyer can still pay before expiry
    let order = f.engine.get_order(&order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Reserved);
    let p = product(&f);
    assert_eq!(p.reserved_stock, 1);
}

#[test]
fn late_payment_after_expiry_is_flagged_not_applied() {
    let f = setup(10, 4_000);
    let order = reserve(&f, 2);

    // Sweep from the future so the hold lapses first
    let stats = f.engine.expire_due(order.expires_at + 1).unwrap();
    assert_eq!(stats.expired, 1);

    let ack = f
        .engine
        .handle_payment_event(payment_event(&order, "evt_late"))
        .unwrap();
    assert_eq!(ack.outcome, SettlementOutcome::LateOrPaidElsewhere);

    // Terminal state and counters unchanged by the late event
    let order = f.engine.get_order(&order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    let p = product(&f);
    assert_eq!(p.stock, 10);
    assert_eq!(p.reserved_stock, 0);
}

#[test]
fn cancelled_order_payment_is_flagged() {
    let f = setup(10, 4_000);
    let order = reserve(&f, 1);
    f.engine.cancel_order(&order.id).unwrap();

    let ack = f
        .engine
        .handle_payment_event(payment_event(&order, "evt_1"))
        .unwrap();
    assert_eq!(ack.outcome, SettlementOutcome::LateOrPaidElsewhere);
    assert_eq!(product(&f).reserved_stock, 0);
}

#[test]
fn unknown_token_is_an_error() {
    let f = setup(10, 4_000);
    let event = PaymentEvent {
        token: "does-not-exist".into(),
        provider_ref: "ch_x".into(),
        amount: 4_000,
        outcome: PaymentEventOutcome::Success,
        idempotency_key: "evt_x".into(),
    };
    assert!(f.engine.handle_payment_event(event).is_err());
}
