//! Orchestration over the current order set.
//!
//! The workspace holds the billable orders matching one [`BillingQuery`] and
//! the billing report derived from them. Every mutation goes through a
//! service, after which the touched orders are re-read from the store and the
//! report is rebuilt. A failed mutation leaves both untouched. A saved mutation
//! whose re-read fails still succeeds and marks the workspace stale until the
//! next refresh.

use std::{collections::HashMap, future::Future, sync::Arc};

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    commands::orders::{PriceChange, ReconcileOutcome, ShipOrderResult},
    currency::Currency,
    errors::{BatchTally, ServiceError},
    models::Order,
    services::{
        billing::{build_report, BillingOptions, BillingQuery, BillingReport},
        invoicing::ExportTally,
        order_status::OrderEvent,
        orders::PaymentUpdate,
        reconciliation::PriceCatalog,
        returns::BillingEntry,
        totals::TotalPolicy,
    },
    AppServices,
};

pub struct OrderWorkspace {
    services: AppServices,
    query: BillingQuery,
    options: BillingOptions,
    orders: HashMap<Uuid, Order>,
    report: BillingReport,
    stale: bool,
}

impl OrderWorkspace {
    /// Loads the order set for `query` and builds its report.
    #[instrument(skip(services))]
    pub async fn load(
        services: AppServices,
        query: BillingQuery,
        options: BillingOptions,
    ) -> Result<Self, ServiceError> {
        let orders = services.billing.load_billable(&query).await?;
        let orders: HashMap<Uuid, Order> = orders.into_iter().map(|o| (o.id, o)).collect();
        let report = Self::build(&services, &query, options, &orders)?;
        Ok(Self {
            services,
            query,
            options,
            orders,
            report,
            stale: false,
        })
    }

    fn build(
        services: &AppServices,
        query: &BillingQuery,
        options: BillingOptions,
        orders: &HashMap<Uuid, Order>,
    ) -> Result<BillingReport, ServiceError> {
        let set: Vec<Order> = orders.values().cloned().collect();
        build_report(&set, query, options, services.billing.rate())
    }

    pub fn report(&self) -> &BillingReport {
        &self.report
    }

    pub fn entries(&self) -> &[BillingEntry] {
        &self.report.entries
    }

    pub fn order(&self, order_id: Uuid) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Whether a saved change could not be re-read; `refresh` clears it.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn query(&self) -> &BillingQuery {
        &self.query
    }

    /// Switches to another query or sort and reloads.
    pub async fn set_view(
        &mut self,
        query: BillingQuery,
        options: BillingOptions,
    ) -> Result<(), ServiceError> {
        let orders = self.services.billing.load_billable(&query).await?;
        let orders: HashMap<Uuid, Order> = orders.into_iter().map(|o| (o.id, o)).collect();
        let report = Self::build(&self.services, &query, options, &orders)?;
        self.query = query;
        self.options = options;
        self.orders = orders;
        self.report = report;
        self.stale = false;
        Ok(())
    }

    /// Reloads the whole set from the store.
    pub async fn refresh(&mut self) -> Result<(), ServiceError> {
        let query = self.query.clone();
        self.set_view(query, self.options).await
    }

    /// Runs `mutation`, then re-reads `order_id` and rebuilds the report. An
    /// order that no longer matches the query leaves the set.
    async fn apply<T, F>(&mut self, order_id: Uuid, mutation: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let value = mutation.await?;
        let fresh = match self.services.orders.get_order(order_id).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Saved change could not be re-read");
                self.stale = true;
                return Ok(value);
            }
        };

        let mut orders = self.orders.clone();
        if self.query.matches(&fresh) {
            orders.insert(order_id, fresh);
        } else {
            debug!(order_id = %order_id, "Order left the billing view");
            orders.remove(&order_id);
        }
        self.report = Self::build(&self.services, &self.query, self.options, &orders)?;
        self.orders = orders;
        Ok(value)
    }

    pub async fn update_payment(
        &mut self,
        order_id: Uuid,
        update: PaymentUpdate,
    ) -> Result<Order, ServiceError> {
        let service = self.services.orders.clone();
        self.apply(order_id, service.update_payment(order_id, update))
            .await
    }

    pub async fn set_added_to_bill(
        &mut self,
        order_id: Uuid,
        added_to_bill: bool,
    ) -> Result<Order, ServiceError> {
        let service = self.services.orders.clone();
        self.apply(order_id, service.set_added_to_bill(order_id, added_to_bill))
            .await
    }

    pub async fn update_delivery_time(
        &mut self,
        order_id: Uuid,
        delivery_time: &str,
    ) -> Result<Order, ServiceError> {
        let service = self.services.orders.clone();
        let result = self
            .apply(order_id, service.update_delivery_time(order_id, delivery_time))
            .await?;
        Ok(result.order)
    }

    pub async fn update_item_prices(
        &mut self,
        order_id: Uuid,
        changes: Vec<PriceChange>,
    ) -> Result<Order, ServiceError> {
        let service = self.services.orders.clone();
        self.apply(order_id, service.update_item_prices(order_id, changes))
            .await
    }

    pub async fn record_return(
        &mut self,
        order_id: Uuid,
        product_id: Uuid,
        amount_returned: Decimal,
    ) -> Result<Order, ServiceError> {
        let service = self.services.orders.clone();
        self.apply(
            order_id,
            service.record_return(order_id, product_id, amount_returned),
        )
        .await
    }

    /// Fires a state-machine event. Cancel requires `confirmed`.
    pub async fn transition(
        &mut self,
        order_id: Uuid,
        event: OrderEvent,
        confirmed: bool,
    ) -> Result<Order, ServiceError> {
        let service = self.services.order_status.clone();
        self.apply(order_id, async move {
            match event {
                OrderEvent::StartProcessing => service.start_processing(order_id).await,
                OrderEvent::MarkReady => service.mark_ready(order_id).await,
                OrderEvent::Ship => service.ship(order_id).await.map(|r| r.order),
                OrderEvent::MarkDelivered => service.mark_delivered(order_id).await,
                OrderEvent::Cancel => service.cancel(order_id, confirmed).await,
                OrderEvent::Uncancel => service.uncancel(order_id).await,
            }
        })
        .await
    }

    /// Ships an order and reports the follow-up outcome.
    pub async fn ship(&mut self, order_id: Uuid) -> Result<ShipOrderResult, ServiceError> {
        let service = self.services.order_status.clone();
        self.apply(order_id, service.ship(order_id)).await
    }

    pub async fn override_status(
        &mut self,
        order_id: Uuid,
        status: &str,
    ) -> Result<Order, ServiceError> {
        let service = self.services.order_status.clone();
        self.apply(order_id, service.override_status(order_id, status))
            .await
    }

    pub async fn reconcile_order(
        &mut self,
        order_id: Uuid,
        catalog: Arc<PriceCatalog>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let service = self.services.reconciliation.clone();
        self.apply(order_id, service.reconcile_one(order_id, catalog))
            .await
    }

    /// Reconciles every real order in the set, then reloads it.
    pub async fn reconcile_all(
        &mut self,
        catalog: Arc<PriceCatalog>,
        cancel: &CancellationToken,
    ) -> Result<BatchTally, ServiceError> {
        let orders: Vec<Order> = self.orders.values().cloned().collect();
        let tally = self
            .services
            .reconciliation
            .reconcile_orders(orders, catalog, cancel)
            .await;
        self.refresh().await?;
        Ok(tally)
    }

    /// Renders every entry of the current display sequence.
    pub async fn export(
        &self,
        currency: Currency,
        policy: TotalPolicy,
        cancel: &CancellationToken,
    ) -> ExportTally {
        self.services
            .invoicing
            .export_all(&self.report.entries, currency, policy, cancel)
            .await
    }
}
