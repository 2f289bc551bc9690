use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::Record;
use crate::models::{
    Household, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, Product, Vendor,
};

/// Partial update of an order. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub items: Option<Vec<OrderItem>>,
    pub delivery_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub is_paid: Option<bool>,
    pub added_to_bill: Option<bool>,
    pub has_returned_item: Option<bool>,
    pub delivery_time: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Record for Order {
    const COLLECTION: &'static str = "Order";
    type Patch = OrderPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn apply(&mut self, patch: &OrderPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(items) = &patch.items {
            self.items = items.clone();
        }
        if let Some(delivery_price) = patch.delivery_price {
            self.delivery_price = delivery_price;
        }
        if let Some(total_amount) = patch.total_amount {
            self.total_amount = total_amount;
        }
        if let Some(payment_status) = patch.payment_status {
            self.payment_status = payment_status;
        }
        if let Some(payment_method) = patch.payment_method {
            self.payment_method = payment_method;
        }
        if let Some(is_paid) = patch.is_paid {
            self.is_paid = is_paid;
        }
        if let Some(added_to_bill) = patch.added_to_bill {
            self.added_to_bill = added_to_bill;
        }
        if let Some(has_returned_item) = patch.has_returned_item {
            self.has_returned_item = has_returned_item;
        }
        if let Some(delivery_time) = &patch.delivery_time {
            self.delivery_time = Some(delivery_time.clone());
        }
    }

    fn touch(&mut self) {
        self.updated_date = Utc::now();
    }
}

// Reference collections are replaced wholesale; this core never edits them.
macro_rules! replace_on_update {
    ($ty:ty, $collection:literal) => {
        impl Record for $ty {
            const COLLECTION: &'static str = $collection;
            type Patch = $ty;

            fn id(&self) -> Uuid {
                self.id
            }

            fn set_id(&mut self, id: Uuid) {
                self.id = id;
            }

            fn apply(&mut self, patch: &$ty) {
                let id = self.id;
                *self = patch.clone();
                self.id = id;
            }
        }
    };
}

replace_on_update!(Household, "Household");
replace_on_update!(Vendor, "Vendor");
replace_on_update!(Product, "Product");
