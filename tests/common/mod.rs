#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use marketplace_billing::{
    commands::CommandContext,
    models::{Order, OrderItem, OrderStatus, Product, Vendor},
    notifications::{LogNotifier, Notifier},
    store::{InMemoryStore, Query, Record, RecordStore, StoreError},
};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory store whose writes can be made to fail on demand.
pub struct FlakyStore<R: Record> {
    inner: InMemoryStore<R>,
    pub fail_get: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub updates: AtomicUsize,
}

impl<R: Record> FlakyStore<R> {
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        Self {
            inner: InMemoryStore::with_records(records),
            fail_get: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.inner.snapshot()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for FlakyStore<R> {
    async fn get(&self, id: Uuid) -> Result<R, StoreError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read refused".into()));
        }
        self.inner.get(id).await
    }

    async fn filter(&self, query: &Query<R>) -> Result<Vec<R>, StoreError> {
        self.inner.filter(query).await
    }

    async fn create(&self, record: R) -> Result<R, StoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("create refused".into()));
        }
        self.inner.create(record).await
    }

    async fn update(&self, id: Uuid, patch: R::Patch) -> Result<R, StoreError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("update refused".into()));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, patch).await
    }
}

pub fn context(store: Arc<FlakyStore<Order>>, notifier: Arc<dyn Notifier>) -> CommandContext {
    CommandContext::new(store, notifier, TIMEOUT)
}

pub fn quiet_context(store: Arc<FlakyStore<Order>>) -> CommandContext {
    context(store, Arc::new(LogNotifier))
}

pub fn item(price: Decimal, quantity: Decimal, actual: Option<Decimal>) -> OrderItem {
    let mut item = OrderItem::new(Uuid::new_v4(), "Tomatoes", price, quantity);
    item.actual_quantity = actual;
    item.shopped = actual.map_or(false, |qty| qty > Decimal::ZERO);
    item
}

pub fn order_with(status: OrderStatus, items: Vec<OrderItem>, delivery_price: Decimal) -> Order {
    let mut order = Order::new(Uuid::new_v4(), Some(Uuid::new_v4()), "shopper@example.test");
    order.status = status;
    order.customer_name = Some("Dana".into());
    order.delivery_address = Some("12 Herzl St".into());
    order.phone = Some("+972-50-000-0000".into());
    order.items = items;
    order.delivery_price = delivery_price;
    order
}

pub fn product(id: Uuid, price_base: Option<Decimal>) -> Product {
    Product {
        id,
        vendor_id: None,
        name: "Catalog item".into(),
        sku: None,
        unit: None,
        price_base,
    }
}

pub fn vendor(id: Uuid, delivery_fee: Decimal) -> Vendor {
    Vendor {
        id,
        name: "Green Grocer".into(),
        delivery_fee,
    }
}
