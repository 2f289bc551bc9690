mod common;

use std::sync::{atomic::Ordering, Arc};
use std::time::Duration;

use common::{item, order_with, product, quiet_context, vendor, FlakyStore};
use marketplace_billing::{
    errors::ErrorCategory,
    models::{Order, OrderStatus},
    services::{
        bulk::BulkSettings,
        reconciliation::{PriceCatalog, PriceReconciliationService, ReconcileScope},
    },
    store::RecordStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Fixture {
    store: Arc<FlakyStore<Order>>,
    catalog: Arc<PriceCatalog>,
    vendor_id: Uuid,
    stale_id: Uuid,
    current_id: Uuid,
}

fn fixture() -> Fixture {
    let vendor_id = Uuid::new_v4();
    let milk = item(dec!(5), dec!(2), Some(dec!(2)));
    let bread = item(dec!(8), dec!(1), Some(dec!(1)));

    let mut stale = order_with(OrderStatus::Delivered, vec![milk.clone(), bread.clone()], dec!(10));
    stale.vendor_id = vendor_id;
    stale.total_amount = dec!(28);

    let mut current_milk = milk.clone();
    current_milk.price = dec!(6);
    let mut current = order_with(OrderStatus::Delivery, vec![current_milk], dec!(12));
    current.vendor_id = vendor_id;
    current.total_amount = dec!(24);

    let catalog = PriceCatalog::new(
        &[product(milk.product_id, Some(dec!(6))), product(bread.product_id, None)],
        &[vendor(vendor_id, dec!(12))],
    );

    Fixture {
        stale_id: stale.id,
        current_id: current.id,
        store: Arc::new(FlakyStore::with_records([stale, current])),
        catalog: Arc::new(catalog),
        vendor_id,
    }
}

fn service(store: Arc<FlakyStore<Order>>, settings: BulkSettings) -> PriceReconciliationService {
    PriceReconciliationService::new(quiet_context(store), settings)
}

#[tokio::test]
async fn bulk_updates_changed_orders_and_skips_the_rest() {
    let f = fixture();
    let svc = service(f.store.clone(), BulkSettings::unpaced(1));

    let tally = svc
        .reconcile_bulk(ReconcileScope::default(), f.catalog.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(tally.updated, 1);
    assert_eq!(tally.skipped, 1);
    assert!(tally.failed.is_empty());

    let stale = f.store.get(f.stale_id).await.unwrap();
    assert_eq!(stale.items[0].price, dec!(6));
    assert_eq!(stale.items[1].price, dec!(8));
    assert_eq!(stale.delivery_price, dec!(12));
    assert_eq!(stale.total_amount, dec!(32));
    assert_eq!(f.store.update_count(), 1);
}

#[tokio::test]
async fn second_run_on_unchanged_catalog_updates_nothing() {
    let f = fixture();
    let svc = service(f.store.clone(), BulkSettings::unpaced(2));
    let cancel = CancellationToken::new();

    let first = svc
        .reconcile_bulk(ReconcileScope::default(), f.catalog.clone(), &cancel)
        .await
        .unwrap();
    assert_eq!(first.updated, 1);

    let second = svc
        .reconcile_bulk(ReconcileScope::default(), f.catalog.clone(), &cancel)
        .await
        .unwrap();
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(f.store.update_count(), 1);
}

#[tokio::test]
async fn per_order_failures_are_tallied_and_the_batch_continues() {
    let f = fixture();
    f.store.fail_update.store(true, Ordering::SeqCst);
    let svc = service(f.store.clone(), BulkSettings::unpaced(1));

    let tally = svc
        .reconcile_bulk(ReconcileScope::default(), f.catalog.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(tally.updated, 0);
    assert_eq!(tally.skipped, 1);
    assert_eq!(tally.failed_count(), 1);
    assert_eq!(tally.failed[0].order_id, f.stale_id);
    assert_eq!(tally.failed[0].category, ErrorCategory::Remote);
    assert!(tally.failed[0].error.contains("reconcile_prices"));
}

#[tokio::test]
async fn scope_limits_the_batch() {
    let f = fixture();
    let svc = service(f.store.clone(), BulkSettings::unpaced(1));

    let tally = svc
        .reconcile_bulk(
            ReconcileScope {
                vendor_id: Some(Uuid::new_v4()),
                household_id: None,
            },
            f.catalog.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(tally.total(), 0);

    let tally = svc
        .reconcile_bulk(
            ReconcileScope {
                vendor_id: Some(f.vendor_id),
                household_id: None,
            },
            f.catalog.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(tally.total(), 2);
}

#[tokio::test]
async fn single_order_reconciliation_reports_no_op() {
    let f = fixture();
    let svc = service(f.store.clone(), BulkSettings::default());

    let outcome = svc.reconcile_one(f.current_id, f.catalog.clone()).await.unwrap();
    assert!(!outcome.is_updated());
    let outcome = svc.reconcile_one(f.stale_id, f.catalog.clone()).await.unwrap();
    assert!(outcome.is_updated());
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_before_remaining_orders() {
    let f = fixture();
    let settings = BulkSettings {
        pacing: Duration::from_secs(60),
        concurrency: 1,
    };
    let svc = service(f.store.clone(), settings);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let tally = svc
        .reconcile_bulk(ReconcileScope::default(), f.catalog.clone(), &cancel)
        .await
        .unwrap();
    assert!(tally.was_cancelled());
    assert_eq!(tally.not_attempted, 1);
    assert_eq!(tally.updated + tally.skipped, 1);
    assert!(tally.failed.is_empty());
}

#[tokio::test]
async fn negative_catalog_price_fails_only_that_order() {
    let f = fixture();
    let stale = f.store.get(f.stale_id).await.unwrap();
    let catalog = Arc::new(PriceCatalog::new(
        &[product(stale.items[1].product_id, Some(dec!(-2)))],
        &[vendor(f.vendor_id, dec!(12))],
    ));
    let svc = service(f.store.clone(), BulkSettings::unpaced(1));

    let tally = svc
        .reconcile_bulk(ReconcileScope::default(), catalog, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(tally.failed_count(), 1);
    assert_eq!(tally.failed[0].category, ErrorCategory::Validation);
    assert_eq!(tally.skipped, 1);
    assert_eq!(f.store.get(f.stale_id).await.unwrap().total_amount, Decimal::from(28));
}
