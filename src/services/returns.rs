//! Return expansion.
//!
//! Returns are modelled as an independent negative transaction that sits next
//! to the original order, never as a correction of it: the parent's
//! `total_amount` stays as invoiced so historical invoices do not move.
//! Virtual returns exist only in computed sequences and are never written to
//! the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    currency::Currency,
    models::{Order, OrderItem},
};

/// Status label carried by virtual returns. Not an `OrderStatus`.
pub const RETURN_PROCESSED: &str = "return_processed";

/// One credited line of a virtual return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: Option<String>,
    pub unit: Option<String>,
    pub price: Decimal,
    pub amount_returned: Decimal,
    /// `-(price × amount_returned)`
    pub credit: Decimal,
}

impl From<&OrderItem> for ReturnedLine {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            sku: item.sku.clone(),
            unit: item.unit.clone(),
            price: item.price,
            amount_returned: item.amount_returned,
            credit: -item.returned_value(),
        }
    }
}

/// Credit note derived from an order's returned items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualReturn {
    pub parent_id: Uuid,
    pub parent_order_number: String,
    pub vendor_id: Uuid,
    pub household_id: Option<Uuid>,
    pub user_email: String,
    pub order_currency: Currency,
    pub lines: Vec<ReturnedLine>,
    /// Negative sum of the credited lines.
    pub total_amount: Decimal,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl VirtualReturn {
    pub fn display_id(&self) -> String {
        format!("{}-return", self.parent_id)
    }

    /// Positive value of the credit.
    pub fn credit_value(&self) -> Decimal {
        -self.total_amount
    }
}

/// Either a persisted order or the virtual return derived from one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum BillingEntry {
    Order(Order),
    Return(VirtualReturn),
}

impl BillingEntry {
    /// Id of the persisted order this entry belongs to.
    pub fn parent_id(&self) -> Uuid {
        match self {
            BillingEntry::Order(order) => order.id,
            BillingEntry::Return(ret) => ret.parent_id,
        }
    }

    pub fn display_id(&self) -> String {
        match self {
            BillingEntry::Order(order) => order.id.to_string(),
            BillingEntry::Return(ret) => ret.display_id(),
        }
    }

    pub fn order_number(&self) -> &str {
        match self {
            BillingEntry::Order(order) => &order.order_number,
            BillingEntry::Return(ret) => &ret.parent_order_number,
        }
    }

    pub fn status_label(&self) -> String {
        match self {
            BillingEntry::Order(order) => order.status.to_string(),
            BillingEntry::Return(_) => RETURN_PROCESSED.to_string(),
        }
    }

    pub fn total_amount(&self) -> Decimal {
        match self {
            BillingEntry::Order(order) => order.total_amount,
            BillingEntry::Return(ret) => ret.total_amount,
        }
    }

    pub fn currency(&self) -> Currency {
        match self {
            BillingEntry::Order(order) => order.order_currency,
            BillingEntry::Return(ret) => ret.order_currency,
        }
    }

    pub fn vendor_id(&self) -> Uuid {
        match self {
            BillingEntry::Order(order) => order.vendor_id,
            BillingEntry::Return(ret) => ret.vendor_id,
        }
    }

    pub fn household_id(&self) -> Option<Uuid> {
        match self {
            BillingEntry::Order(order) => order.household_id,
            BillingEntry::Return(ret) => ret.household_id,
        }
    }

    pub fn created_date(&self) -> DateTime<Utc> {
        match self {
            BillingEntry::Order(order) => order.created_date,
            BillingEntry::Return(ret) => ret.created_date,
        }
    }

    pub fn updated_date(&self) -> DateTime<Utc> {
        match self {
            BillingEntry::Order(order) => order.updated_date,
            BillingEntry::Return(ret) => ret.updated_date,
        }
    }

    /// Payment flags; virtual returns take no part in payment bookkeeping.
    pub fn is_paid(&self) -> Option<bool> {
        match self {
            BillingEntry::Order(order) => Some(order.is_paid),
            BillingEntry::Return(_) => None,
        }
    }

    pub fn added_to_bill(&self) -> Option<bool> {
        match self {
            BillingEntry::Order(order) => Some(order.added_to_bill),
            BillingEntry::Return(_) => None,
        }
    }

    pub fn as_order(&self) -> Option<&Order> {
        match self {
            BillingEntry::Order(order) => Some(order),
            BillingEntry::Return(_) => None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, BillingEntry::Return(_))
    }
}

/// Virtual return for `order`, if `has_returned_item` is set and at least one
/// item is a credited return.
pub fn virtual_return(order: &Order) -> Option<VirtualReturn> {
    let lines: Vec<ReturnedLine> = order.returned_items().map(ReturnedLine::from).collect();
    if lines.is_empty() {
        return None;
    }
    let total_amount = lines.iter().map(|line| line.credit).sum();
    Some(VirtualReturn {
        parent_id: order.id,
        parent_order_number: order.order_number.clone(),
        vendor_id: order.vendor_id,
        household_id: order.household_id,
        user_email: order.user_email.clone(),
        order_currency: order.order_currency,
        lines,
        total_amount,
        created_date: order.created_date,
        updated_date: order.updated_date,
    })
}

/// `[order]`, or `[order, virtual_return]` when the order has credited
/// returns. The order is passed through unchanged.
pub fn expand(order: &Order) -> Vec<BillingEntry> {
    let mut entries = vec![BillingEntry::Order(order.clone())];
    if let Some(ret) = virtual_return(order) {
        entries.push(BillingEntry::Return(ret));
    }
    entries
}

/// Expands every order, keeping each return directly after its parent.
pub fn expand_all<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Vec<BillingEntry> {
    orders.into_iter().flat_map(expand).collect()
}
