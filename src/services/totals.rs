//! Order total calculation.
//!
//! `compute_total` is pure and always re-derivable from stored fields. It is
//! distinct from `Order::total_amount`, which is a cache refreshed only by
//! explicit saves.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ServiceError,
    models::{Order, OrderItem},
};

/// Which items count towards a total. Every report and invoice records the
/// policy it was computed with.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TotalPolicy {
    /// Every item at its effective quantity.
    #[default]
    AllItems,
    /// Only items that were actually supplied.
    ShoppedOnly,
}

impl TotalPolicy {
    /// Quantity the item contributes under this policy, `None` if it does not
    /// contribute at all.
    pub fn billed_quantity(self, item: &OrderItem) -> Option<Decimal> {
        match self {
            TotalPolicy::AllItems => Some(item.effective_quantity()),
            TotalPolicy::ShoppedOnly if item.is_shopped() => Some(item.effective_quantity()),
            TotalPolicy::ShoppedOnly => None,
        }
    }
}

/// Sum of `price × quantity` over contributing items. Assumes amounts were
/// validated; a sum beyond the decimal range is a validation error.
pub fn subtotal(items: &[OrderItem], policy: TotalPolicy) -> Result<Decimal, ServiceError> {
    items
        .iter()
        .filter_map(|item| policy.billed_quantity(item).map(|qty| (item, qty)))
        .try_fold(Decimal::ZERO, |acc, (item, qty)| {
            item.price
                .checked_mul(qty)
                .and_then(|line| acc.checked_add(line))
                .ok_or_else(|| {
                    ServiceError::validation(format!(
                        "total overflows at item {} ({} x {})",
                        item.product_id, item.price, qty
                    ))
                })
        })
}

/// Subtotal plus delivery fee. Rejects negative prices and quantities instead
/// of computing with them.
pub fn compute_total(order: &Order, policy: TotalPolicy) -> Result<Decimal, ServiceError> {
    order.validate_amounts()?;
    subtotal(&order.items, policy)?
        .checked_add(order.delivery_price)
        .ok_or_else(|| {
            ServiceError::validation(format!("order {} total overflows", order.id))
        })
}
