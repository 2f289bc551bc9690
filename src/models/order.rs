use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order_item::OrderItem;
use crate::{currency::Currency, errors::ServiceError};

/// Enum representing the possible statuses of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    FollowUp,
    Shopping,
    ReadyForShipping,
    Delivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Delivered and cancelled orders accept no further cancel.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Orders out for delivery or delivered are eligible for billing.
    pub fn is_billable(self) -> bool {
        matches!(self, OrderStatus::Delivery | OrderStatus::Delivered)
    }
}

/// Who settles the order.
#[derive(
    Clone,
    Copy,
    Debug,
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
pub enum PaymentStatus {
    Client,
    Kcs,
    Denied,
    #[default]
    None,
}

#[derive(
    Clone,
    Copy,
    Debug,
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
pub enum PaymentMethod {
    CreditCard,
    BankTransfer,
    Bit,
    Cash,
    Check,
    #[default]
    None,
}

/// A persisted order. Items are owned by the order and have no identity of
/// their own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned identifier.
    pub id: Uuid,

    /// Human-readable number derived from vendor and household.
    pub order_number: String,

    /// Current status of the order.
    pub status: OrderStatus,

    pub vendor_id: Uuid,

    #[serde(default)]
    pub household_id: Option<Uuid>,

    pub user_email: String,

    /// Name shown on the delivery label.
    #[serde(default)]
    pub customer_name: Option<String>,

    #[serde(default)]
    pub delivery_address: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    /// Line items, in display order.
    #[serde(default)]
    pub items: Vec<OrderItem>,

    /// Delivery fee, denominated in `order_currency`.
    #[serde(default)]
    pub delivery_price: Decimal,

    #[serde(default)]
    pub order_currency: Currency,

    /// Cached total. Only refreshed by explicit save actions, so it may lag the
    /// value computed from items.
    #[serde(default)]
    pub total_amount: Decimal,

    #[serde(default)]
    pub payment_status: PaymentStatus,

    #[serde(default)]
    pub payment_method: PaymentMethod,

    #[serde(default)]
    pub is_paid: bool,

    #[serde(default)]
    pub added_to_bill: bool,

    /// True iff any item satisfies the return predicate.
    #[serde(default)]
    pub has_returned_item: bool,

    pub created_date: DateTime<Utc>,

    pub updated_date: DateTime<Utc>,

    /// Free-text delivery window.
    #[serde(default)]
    pub delivery_time: Option<String>,
}

impl Order {
    /// Creates a pending order with no items.
    pub fn new(vendor_id: Uuid, household_id: Option<Uuid>, user_email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_number: OrderNumber::generate(vendor_id, household_id, now).into_string(),
            status: OrderStatus::Pending,
            vendor_id,
            household_id,
            user_email: user_email.into(),
            customer_name: None,
            delivery_address: None,
            phone: None,
            items: Vec::new(),
            delivery_price: Decimal::ZERO,
            order_currency: Currency::default(),
            total_amount: Decimal::ZERO,
            payment_status: PaymentStatus::default(),
            payment_method: PaymentMethod::default(),
            is_paid: false,
            added_to_bill: false,
            has_returned_item: false,
            created_date: now,
            updated_date: now,
            delivery_time: None,
        }
    }

    /// Items whose return should be credited. Empty while `has_returned_item`
    /// is unset, so every billing figure reads the same source.
    pub fn returned_items(&self) -> impl Iterator<Item = &OrderItem> + '_ {
        let flagged = self.has_returned_item;
        self.items
            .iter()
            .filter(move |item| flagged && item.is_credited_return())
    }

    pub fn has_credited_returns(&self) -> bool {
        self.returned_items().next().is_some()
    }

    /// Value of all credited returns, in the order's currency.
    pub fn returned_value(&self) -> Decimal {
        self.returned_items().map(OrderItem::returned_value).sum()
    }

    /// Recomputes `has_returned_item` from the items.
    pub fn refresh_return_flag(&mut self) {
        let has_returned = self.items.iter().any(OrderItem::is_credited_return);
        self.has_returned_item = has_returned;
    }

    /// Items that were not supplied at all and need a follow-up order.
    pub fn unfulfilled_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|item| item.is_unfulfilled())
    }

    /// Rejects monetary fields a total could not sensibly be computed from.
    pub fn validate_amounts(&self) -> Result<(), ServiceError> {
        if self.delivery_price < Decimal::ZERO {
            return Err(ServiceError::validation(format!(
                "order {} has negative delivery price {}",
                self.id, self.delivery_price
            )));
        }
        for item in &self.items {
            item.validate_amounts().map_err(|e| match e {
                ServiceError::ValidationError(msg) => {
                    ServiceError::validation(format!("order {}: {}", self.id, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

/// Order number of the form `VVVV-HHHH-yyMMddHHmmss`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate(vendor_id: Uuid, household_id: Option<Uuid>, at: DateTime<Utc>) -> Self {
        let vendor = prefix(&vendor_id);
        let household = household_id
            .as_ref()
            .map(prefix)
            .unwrap_or_else(|| "0000".to_string());
        Self(format!("{}-{}-{}", vendor, household, at.format("%y%m%d%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn prefix(id: &Uuid) -> String {
    id.simple().to_string()[..4].to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(OrderStatus::ReadyForShipping.to_string(), "ready_for_shipping");
        assert_eq!(
            OrderStatus::from_str("follow_up").unwrap(),
            OrderStatus::FollowUp
        );
        assert!(OrderStatus::from_str("return_processed").is_err());
        assert_eq!(
            serde_json::to_string(&OrderStatus::Delivery).unwrap(),
            "\"delivery\""
        );
    }

    #[test]
    fn billable_and_terminal_statuses() {
        assert!(OrderStatus::Delivery.is_billable());
        assert!(OrderStatus::Delivered.is_billable());
        assert!(!OrderStatus::Shopping.is_billable());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Delivery.is_terminal());
    }

    #[test]
    fn order_number_uses_vendor_and_household_prefixes() {
        let vendor = Uuid::parse_str("abcd1234-0000-0000-0000-000000000000").unwrap();
        let household = Uuid::parse_str("00ef5678-0000-0000-0000-000000000000").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();

        let number = OrderNumber::generate(vendor, Some(household), at);
        assert_eq!(number.as_str(), "ABCD-00EF-240307090501");

        let no_household = OrderNumber::generate(vendor, None, at);
        assert_eq!(no_household.as_str(), "ABCD-0000-240307090501");
    }

    #[test]
    fn negative_delivery_price_is_rejected() {
        let mut order = Order::new(Uuid::new_v4(), None, "a@b.test");
        order.delivery_price = dec!(-1);
        assert!(matches!(
            order.validate_amounts(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn stale_return_flag_hides_credited_items() {
        let mut order = Order::new(Uuid::new_v4(), None, "a@b.test");
        let mut item = OrderItem::new(Uuid::new_v4(), "Milk", dec!(10), dec!(3));
        item.actual_quantity = Some(dec!(3));
        item.is_returned = true;
        item.amount_returned = dec!(2);
        order.items = vec![item];

        assert!(!order.has_credited_returns());
        assert_eq!(order.returned_value(), Decimal::ZERO);

        order.refresh_return_flag();
        assert!(order.has_returned_item);
        assert!(order.has_credited_returns());
        assert_eq!(order.returned_value(), dec!(20));
    }

    #[test]
    fn deserializes_sparse_record_with_defaults() {
        let json = serde_json::json!({
            "id": "00000000-0000-0000-0000-000000000001",
            "order_number": "A-1",
            "status": "pending",
            "vendor_id": "00000000-0000-0000-0000-0000000000aa",
            "user_email": "c@d.test",
            "created_date": "2024-01-01T00:00:00Z",
            "updated_date": "2024-01-01T00:00:00Z"
        });
        let order: Order = serde_json::from_value(json).unwrap();
        assert_eq!(order.order_currency, Currency::Ils);
        assert_eq!(order.payment_status, PaymentStatus::None);
        assert_eq!(order.payment_method, PaymentMethod::None);
        assert!(order.items.is_empty());
        assert_eq!(order.delivery_price, Decimal::ZERO);
    }
}
