//! Price reconciliation against the product and vendor catalogs.
//!
//! Each item whose product carries a `price_base` is repriced to it, and the
//! order's delivery price is reset to its vendor's `delivery_fee`. Only orders
//! where something actually changed are written, with the cached total
//! recomputed under [`TotalPolicy::AllItems`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    commands::{
        orders::{ReconcileOrderPricesCommand, ReconcileOutcome},
        Command, CommandContext,
    },
    errors::{BatchTally, ServiceError},
    models::{Order, Product, Vendor},
    services::{
        bulk::{paced, BulkSettings},
        totals::{compute_total, TotalPolicy},
    },
    store::{remote_call, OrderPatch, Query, RecordStore},
};

/// Canonical prices keyed by product and vendor id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceCatalog {
    base_prices: HashMap<Uuid, Decimal>,
    delivery_fees: HashMap<Uuid, Decimal>,
}

impl PriceCatalog {
    pub fn new<'a>(
        products: impl IntoIterator<Item = &'a Product>,
        vendors: impl IntoIterator<Item = &'a Vendor>,
    ) -> Self {
        Self {
            base_prices: products
                .into_iter()
                .filter_map(|p| p.price_base.map(|price| (p.id, price)))
                .collect(),
            delivery_fees: vendors
                .into_iter()
                .map(|v| (v.id, v.delivery_fee))
                .collect(),
        }
    }

    /// Reads both catalogs from their stores.
    pub async fn load(
        products: &dyn RecordStore<Product>,
        vendors: &dyn RecordStore<Vendor>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let products = remote_call(timeout, "list", "products", products.list()).await?;
        let vendors = remote_call(timeout, "list", "vendors", vendors.list()).await?;
        Ok(Self::new(&products, &vendors))
    }

    pub fn base_price(&self, product_id: Uuid) -> Option<Decimal> {
        self.base_prices.get(&product_id).copied()
    }

    pub fn delivery_fee(&self, vendor_id: Uuid) -> Option<Decimal> {
        self.delivery_fees.get(&vendor_id).copied()
    }
}

/// Patch bringing `order` in line with `catalog`, or `None` when it already
/// matches. A negative catalog price is a validation error.
pub fn reconcile_order(
    order: &Order,
    catalog: &PriceCatalog,
) -> Result<Option<OrderPatch>, ServiceError> {
    let mut candidate = order.clone();
    let mut changed = false;

    for item in candidate.items.iter_mut() {
        let Some(base) = catalog.base_price(item.product_id) else {
            continue;
        };
        if base < Decimal::ZERO {
            return Err(ServiceError::validation(format!(
                "catalog price {} for product {} is negative",
                base, item.product_id
            )));
        }
        if base != item.price {
            item.price = base;
            changed = true;
        }
    }

    if let Some(fee) = catalog.delivery_fee(order.vendor_id) {
        if fee < Decimal::ZERO {
            return Err(ServiceError::validation(format!(
                "delivery fee {} for vendor {} is negative",
                fee, order.vendor_id
            )));
        }
        if fee != candidate.delivery_price {
            candidate.delivery_price = fee;
            changed = true;
        }
    }

    if !changed {
        return Ok(None);
    }

    let total_amount = compute_total(&candidate, TotalPolicy::AllItems)?;
    Ok(Some(OrderPatch {
        items: Some(candidate.items),
        delivery_price: Some(candidate.delivery_price),
        total_amount: Some(total_amount),
        ..OrderPatch::default()
    }))
}

/// Which stored orders a bulk reconciliation covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileScope {
    pub vendor_id: Option<Uuid>,
    pub household_id: Option<Uuid>,
}

impl ReconcileScope {
    pub fn matches(&self, order: &Order) -> bool {
        self.vendor_id.map_or(true, |v| order.vendor_id == v)
            && self
                .household_id
                .map_or(true, |h| order.household_id == Some(h))
    }
}

#[derive(Clone)]
pub struct PriceReconciliationService {
    ctx: CommandContext,
    settings: BulkSettings,
}

impl PriceReconciliationService {
    pub fn new(ctx: CommandContext, settings: BulkSettings) -> Self {
        Self { ctx, settings }
    }

    #[instrument(skip(self, catalog))]
    pub async fn reconcile_one(
        &self,
        order_id: Uuid,
        catalog: Arc<PriceCatalog>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        ReconcileOrderPricesCommand::new(order_id, catalog)
            .execute(&self.ctx)
            .await
    }

    /// Loads every order in `scope` and reconciles it. Only a failure to load
    /// the set is returned as an error; per-order failures land in the tally.
    #[instrument(skip(self, catalog, cancel))]
    pub async fn reconcile_bulk(
        &self,
        scope: ReconcileScope,
        catalog: Arc<PriceCatalog>,
        cancel: &CancellationToken,
    ) -> Result<BatchTally, ServiceError> {
        let query = Query::filter(move |order: &Order| scope.matches(order));
        let orders = remote_call(
            self.ctx.remote_timeout,
            "filter",
            "orders",
            self.ctx.orders.filter(&query),
        )
        .await?;
        Ok(self.reconcile_orders(orders, catalog, cancel).await)
    }

    /// Reconciles an already-loaded set.
    pub async fn reconcile_orders(
        &self,
        orders: Vec<Order>,
        catalog: Arc<PriceCatalog>,
        cancel: &CancellationToken,
    ) -> BatchTally {
        let ctx = &self.ctx;
        let pacing = self.settings.pacing;
        let total = orders.len();

        let results: Vec<(Uuid, Result<ReconcileOutcome, ServiceError>)> =
            stream::iter(orders.into_iter().enumerate())
                .map(|(index, order)| {
                    let command = ReconcileOrderPricesCommand::new(order.id, catalog.clone());
                    async move {
                        let result =
                            paced(index, pacing, cancel, command.execute_for(&order, ctx)).await;
                        (order.id, result)
                    }
                })
                .buffer_unordered(self.settings.concurrency())
                .collect()
                .await;

        let mut tally = BatchTally::default();
        for (order_id, result) in results {
            match result {
                Ok(ReconcileOutcome::Updated { .. }) => tally.updated += 1,
                Ok(ReconcileOutcome::Unchanged { .. }) => tally.skipped += 1,
                Err(e) => {
                    if !matches!(e, ServiceError::Cancelled) {
                        error!(order_id = %order_id, error = %e, "Failed to reconcile order prices");
                    }
                    tally.record_failure(order_id, &e);
                }
            }
        }

        info!(
            total,
            updated = tally.updated,
            skipped = tally.skipped,
            failed = tally.failed_count(),
            not_attempted = tally.not_attempted,
            "Price reconciliation finished"
        );
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;
    use rust_decimal_macros::dec;

    fn product(id: Uuid, price_base: Option<Decimal>) -> Product {
        Product {
            id,
            vendor_id: None,
            name: "p".into(),
            sku: None,
            unit: None,
            price_base,
        }
    }

    fn vendor(id: Uuid, fee: Decimal) -> Vendor {
        Vendor {
            id,
            name: "v".into(),
            delivery_fee: fee,
        }
    }

    #[test]
    fn reprices_items_and_delivery_fee() {
        let vendor_id = Uuid::new_v4();
        let apples = Uuid::new_v4();
        let pears = Uuid::new_v4();
        let mut order = Order::new(vendor_id, None, "c@c.test");
        order.delivery_price = dec!(10);
        order.items.push(OrderItem::new(apples, "apples", dec!(4), dec!(2)));
        order.items.push(OrderItem::new(pears, "pears", dec!(3), dec!(1)));

        let catalog = PriceCatalog::new(
            &[product(apples, Some(dec!(5))), product(pears, None)],
            &[vendor(vendor_id, dec!(15))],
        );
        let patch = reconcile_order(&order, &catalog).unwrap().unwrap();
        let items = patch.items.unwrap();
        assert_eq!(items[0].price, dec!(5));
        assert_eq!(items[1].price, dec!(3));
        assert_eq!(patch.delivery_price, Some(dec!(15)));
        assert_eq!(patch.total_amount, Some(dec!(28)));
    }

    #[test]
    fn matching_order_needs_no_write() {
        let vendor_id = Uuid::new_v4();
        let apples = Uuid::new_v4();
        let mut order = Order::new(vendor_id, None, "c@c.test");
        order.delivery_price = dec!(15);
        order.items.push(OrderItem::new(apples, "apples", dec!(5), dec!(2)));

        let catalog =
            PriceCatalog::new(&[product(apples, Some(dec!(5)))], &[vendor(vendor_id, dec!(15))]);
        assert!(reconcile_order(&order, &catalog).unwrap().is_none());
    }

    #[test]
    fn unknown_vendor_keeps_delivery_price() {
        let mut order = Order::new(Uuid::new_v4(), None, "c@c.test");
        order.delivery_price = dec!(12);
        let catalog = PriceCatalog::default();
        assert!(reconcile_order(&order, &catalog).unwrap().is_none());
    }

    #[test]
    fn negative_catalog_price_is_rejected() {
        let apples = Uuid::new_v4();
        let mut order = Order::new(Uuid::new_v4(), None, "c@c.test");
        order.items.push(OrderItem::new(apples, "apples", dec!(5), dec!(1)));
        let catalog = PriceCatalog::new(&[product(apples, Some(dec!(-1)))], &Vec::<Vendor>::new());
        assert!(matches!(
            reconcile_order(&order, &catalog),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn scope_filters_vendor_and_household() {
        let vendor_id = Uuid::new_v4();
        let household = Uuid::new_v4();
        let order = Order::new(vendor_id, Some(household), "c@c.test");
        assert!(ReconcileScope::default().matches(&order));
        assert!(ReconcileScope {
            vendor_id: Some(vendor_id),
            household_id: Some(household)
        }
        .matches(&order));
        assert!(!ReconcileScope {
            vendor_id: None,
            household_id: Some(Uuid::new_v4())
        }
        .matches(&order));
    }
}
