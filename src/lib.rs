//! Marketplace Billing Library
//!
//! Order lifecycle and billing reconciliation for a grocery delivery
//! marketplace: order totals, return expansion, the order status state
//! machine, billing aggregation, price reconciliation and invoice export.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod commands;
pub mod config;
pub mod currency;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod services;
pub mod store;
pub mod workspace;

use std::sync::Arc;

use commands::CommandContext;
use config::AppConfig;
use errors::ServiceError;
use models::{Household, Order, Product, Vendor};
use notifications::Notifier;
use services::{
    billing::BillingService, invoicing::DocumentRenderer, invoicing::InvoiceService,
    order_status::OrderStatusService, orders::OrderService,
    reconciliation::PriceReconciliationService,
};
use store::{InMemoryStore, RecordStore};

/// The four collections the core reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn RecordStore<Order>>,
    pub households: Arc<dyn RecordStore<Household>>,
    pub vendors: Arc<dyn RecordStore<Vendor>>,
    pub products: Arc<dyn RecordStore<Product>>,
}

impl Stores {
    pub fn in_memory(
        orders: Vec<Order>,
        households: Vec<Household>,
        vendors: Vec<Vendor>,
        products: Vec<Product>,
    ) -> Self {
        Self {
            orders: Arc::new(InMemoryStore::with_records(orders)),
            households: Arc::new(InMemoryStore::with_records(households)),
            vendors: Arc::new(InMemoryStore::with_records(vendors)),
            products: Arc::new(InMemoryStore::with_records(products)),
        }
    }
}

// Service container
#[derive(Clone)]
pub struct AppServices {
    pub stores: Stores,
    pub order_status: OrderStatusService,
    pub orders: OrderService,
    pub billing: BillingService,
    pub reconciliation: PriceReconciliationService,
    pub invoicing: InvoiceService,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Result<Self, ServiceError> {
        let rate = config.exchange_rate()?;
        let timeout = config.remote_timeout();
        let bulk = config.bulk_settings();
        let ctx = CommandContext::new(stores.orders.clone(), notifier, timeout);

        Ok(Self {
            order_status: OrderStatusService::new(ctx.clone()),
            orders: OrderService::new(ctx.clone()),
            billing: BillingService::new(stores.orders.clone(), rate, timeout),
            reconciliation: PriceReconciliationService::new(ctx, bulk),
            invoicing: InvoiceService::new(
                renderer,
                stores.vendors.clone(),
                stores.households.clone(),
                rate,
                timeout,
                bulk,
            ),
            stores,
        })
    }
}
