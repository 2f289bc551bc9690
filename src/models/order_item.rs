use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;

fn default_available() -> bool {
    true
}

/// One line of an order.
///
/// `actual_quantity` is a tri-state: `None` means the supplied amount is not
/// known yet, `Some(0)` means nothing was supplied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct OrderItem {
    pub product_id: Uuid,

    #[validate(length(min = 1, message = "product name is required"))]
    pub product_name: String,

    #[serde(default)]
    pub sku: Option<String>,

    #[serde(default)]
    pub unit: Option<String>,

    /// Unit price in the order's currency at the time of order or last edit.
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,

    /// Ordered quantity.
    #[validate(custom = "validate_non_negative")]
    pub quantity: Decimal,

    /// Quantity actually supplied.
    #[serde(default)]
    pub actual_quantity: Option<Decimal>,

    #[serde(default)]
    pub shopped: bool,

    #[serde(default = "default_available")]
    pub available: bool,

    #[serde(default)]
    pub modified: bool,

    #[serde(default)]
    pub is_returned: bool,

    #[serde(default)]
    pub amount_returned: Decimal,

    #[serde(default)]
    pub substitute_product_id: Option<Uuid>,

    #[serde(default)]
    pub substitute_product_name: Option<String>,
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

impl OrderItem {
    pub fn new(
        product_id: Uuid,
        product_name: impl Into<String>,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            sku: None,
            unit: None,
            price,
            quantity,
            actual_quantity: None,
            shopped: false,
            available: true,
            modified: false,
            is_returned: false,
            amount_returned: Decimal::ZERO,
            substitute_product_id: None,
            substitute_product_name: None,
        }
    }

    /// `actual_quantity` when known, else the ordered `quantity`.
    pub fn effective_quantity(&self) -> Decimal {
        self.actual_quantity.unwrap_or(self.quantity)
    }

    /// Counted under the shopped-only policy: either found on the shelf, or
    /// explicitly supplied in a positive amount.
    pub fn is_shopped(&self) -> bool {
        (self.shopped && self.available)
            || self
                .actual_quantity
                .map_or(false, |qty| qty > Decimal::ZERO)
    }

    /// Nothing was supplied, or the supplied amount was never recorded.
    pub fn is_unfulfilled(&self) -> bool {
        self.actual_quantity.map_or(true, |qty| qty.is_zero())
    }

    /// Return predicate: flagged as returned with a positive amount.
    pub fn is_credited_return(&self) -> bool {
        self.is_returned && self.amount_returned > Decimal::ZERO
    }

    /// Credit owed for this item, zero when it is not a credited return.
    pub fn returned_value(&self) -> Decimal {
        if self.is_credited_return() {
            self.price * self.amount_returned
        } else {
            Decimal::ZERO
        }
    }

    /// Copy of this item ready to be shopped again on a follow-up order.
    pub fn reset_for_follow_up(&self) -> Self {
        Self {
            shopped: false,
            available: true,
            modified: false,
            actual_quantity: None,
            substitute_product_id: None,
            substitute_product_name: None,
            is_returned: false,
            amount_returned: Decimal::ZERO,
            ..self.clone()
        }
    }

    /// Field-level and cross-field checks on prices and quantities.
    pub fn validate_amounts(&self) -> Result<(), ServiceError> {
        self.validate()?;
        if let Some(actual) = self.actual_quantity {
            if actual < Decimal::ZERO {
                return Err(ServiceError::validation(format!(
                    "item {} has negative actual quantity {}",
                    self.product_id, actual
                )));
            }
        }
        if self.amount_returned < Decimal::ZERO {
            return Err(ServiceError::validation(format!(
                "item {} has negative returned amount {}",
                self.product_id, self.amount_returned
            )));
        }
        if self.amount_returned > self.effective_quantity() {
            return Err(ServiceError::validation(format!(
                "item {} returns {} but only {} were supplied",
                self.product_id,
                self.amount_returned,
                self.effective_quantity()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item() -> OrderItem {
        OrderItem::new(Uuid::new_v4(), "Milk 3%", dec!(6.90), dec!(2))
    }

    #[test]
    fn effective_quantity_prefers_actual() {
        let mut it = item();
        assert_eq!(it.effective_quantity(), dec!(2));
        it.actual_quantity = Some(dec!(0));
        assert_eq!(it.effective_quantity(), dec!(0));
        it.actual_quantity = Some(dec!(1.5));
        assert_eq!(it.effective_quantity(), dec!(1.5));
    }

    #[test]
    fn unfulfilled_distinguishes_unknown_zero_and_supplied() {
        let mut it = item();
        assert!(it.is_unfulfilled());
        it.actual_quantity = Some(Decimal::ZERO);
        assert!(it.is_unfulfilled());
        it.actual_quantity = Some(dec!(1));
        assert!(!it.is_unfulfilled());
    }

    #[test]
    fn shopped_predicate() {
        let mut it = item();
        assert!(!it.is_shopped());
        it.shopped = true;
        assert!(it.is_shopped());
        it.available = false;
        assert!(!it.is_shopped());
        it.actual_quantity = Some(dec!(1));
        assert!(it.is_shopped());
    }

    #[test]
    fn returned_value_requires_flag_and_amount() {
        let mut it = item();
        it.amount_returned = dec!(1);
        assert_eq!(it.returned_value(), Decimal::ZERO);
        it.is_returned = true;
        assert_eq!(it.returned_value(), dec!(6.90));
        it.amount_returned = Decimal::ZERO;
        assert!(!it.is_credited_return());
    }

    #[test]
    fn follow_up_reset_clears_fulfilment_fields() {
        let mut it = item();
        it.shopped = true;
        it.available = false;
        it.modified = true;
        it.actual_quantity = Some(Decimal::ZERO);
        it.substitute_product_id = Some(Uuid::new_v4());
        it.substitute_product_name = Some("Milk 1%".into());

        let reset = it.reset_for_follow_up();
        assert!(!reset.shopped);
        assert!(reset.available);
        assert!(!reset.modified);
        assert_eq!(reset.actual_quantity, None);
        assert_eq!(reset.substitute_product_id, None);
        assert_eq!(reset.substitute_product_name, None);
        assert_eq!(reset.price, it.price);
        assert_eq!(reset.quantity, it.quantity);
    }

    #[test]
    fn rejects_negative_price_and_excess_return() {
        let mut it = item();
        it.price = dec!(-1);
        assert!(matches!(
            it.validate_amounts(),
            Err(ServiceError::ValidationError(_))
        ));

        let mut it = item();
        it.actual_quantity = Some(dec!(1));
        it.is_returned = true;
        it.amount_returned = dec!(2);
        assert!(it.validate_amounts().is_err());

        it.amount_returned = dec!(1);
        assert!(it.validate_amounts().is_ok());
    }

    #[test]
    fn available_defaults_to_true_when_missing() {
        let json = serde_json::json!({
            "product_id": "00000000-0000-0000-0000-000000000009",
            "product_name": "Bread",
            "price": "8.5",
            "quantity": "1"
        });
        let it: OrderItem = serde_json::from_value(json).unwrap();
        assert!(it.available);
        assert_eq!(it.actual_quantity, None);
    }
}
