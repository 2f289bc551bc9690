use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    metrics::{FOLLOW_UP_FAILURES, ORDERS_SHIPPED, ORDER_SHIP_FAILURES},
    models::{Order, OrderItem, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus},
    notifications::{MessageType, RecipientType},
    services::{
        order_status::{ensure_transition, OrderEvent},
        totals::{subtotal, TotalPolicy},
    },
    store::OrderPatch,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipOrderCommand {
    pub order_id: Uuid,
}

/// What happened to the unsupplied remainder of a shipped order.
///
/// Creating the follow-up is not transactional with the ship update. A failure
/// leaves a shipped order without its follow-up; it is reported here and never
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FollowUpOutcome {
    /// Every item was supplied.
    NotNeeded,
    Created { order: Order },
    Failed { unfulfilled_items: usize, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipOrderResult {
    pub order: Order,
    /// Whether the customer SMS went out.
    pub customer_notified: bool,
    pub follow_up: FollowUpOutcome,
}

#[async_trait::async_trait]
impl Command for ShipOrderCommand {
    type Result = ShipOrderResult;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        let order = ctx.load_order(self.order_id).await?;
        let to = ensure_transition(&order, OrderEvent::Ship)?;

        let shipped = ctx
            .update_order("ship", self.order_id, OrderPatch::status(to))
            .await
            .map_err(|e| {
                error!(order_id = %self.order_id, error = %e, "Failed to ship order");
                ORDER_SHIP_FAILURES.inc();
                e
            })?;
        ORDERS_SHIPPED.inc();
        info!(order_id = %self.order_id, "Order shipped");

        let customer_notified = ctx
            .notify(shipped.id, MessageType::OrderShipped, RecipientType::Customer)
            .await;

        let follow_up = self.create_follow_up(ctx, &shipped).await;

        Ok(ShipOrderResult {
            order: shipped,
            customer_notified,
            follow_up,
        })
    }
}

impl ShipOrderCommand {
    async fn create_follow_up(&self, ctx: &CommandContext, shipped: &Order) -> FollowUpOutcome {
        let unfulfilled_items = shipped.unfulfilled_items().count();
        let created = match build_follow_up(shipped, Utc::now()) {
            Ok(None) => return FollowUpOutcome::NotNeeded,
            Ok(Some(draft)) => ctx.create_order(draft).await,
            Err(e) => Err(e),
        };

        match created {
            Ok(order) => {
                info!(
                    order_id = %shipped.id,
                    follow_up_id = %order.id,
                    items = unfulfilled_items,
                    total = %order.total_amount,
                    "Follow-up order created"
                );
                FollowUpOutcome::Created { order }
            }
            Err(e) => {
                FOLLOW_UP_FAILURES.inc();
                error!(
                    order_id = %shipped.id,
                    items = unfulfilled_items,
                    error = %e,
                    "Order shipped but follow-up order could not be created"
                );
                FollowUpOutcome::Failed {
                    unfulfilled_items,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Draft follow-up order carrying the unsupplied items of `shipped`, reset for
/// shopping. Its total is `Σ price × quantity` with no delivery fee.
pub fn build_follow_up(
    shipped: &Order,
    now: DateTime<Utc>,
) -> Result<Option<Order>, ServiceError> {
    let items: Vec<OrderItem> = shipped
        .unfulfilled_items()
        .map(OrderItem::reset_for_follow_up)
        .collect();
    if items.is_empty() {
        return Ok(None);
    }
    let total_amount = subtotal(&items, TotalPolicy::AllItems)?;

    Ok(Some(Order {
        id: Uuid::nil(),
        order_number: OrderNumber::generate(shipped.vendor_id, shipped.household_id, now)
            .into_string(),
        status: OrderStatus::FollowUp,
        vendor_id: shipped.vendor_id,
        household_id: shipped.household_id,
        user_email: shipped.user_email.clone(),
        customer_name: shipped.customer_name.clone(),
        delivery_address: shipped.delivery_address.clone(),
        phone: shipped.phone.clone(),
        items,
        delivery_price: Decimal::ZERO,
        order_currency: shipped.order_currency,
        total_amount,
        payment_status: PaymentStatus::None,
        payment_method: PaymentMethod::None,
        is_paid: false,
        added_to_bill: false,
        has_returned_item: false,
        created_date: now,
        updated_date: now,
        delivery_time: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn shipped_order() -> Order {
        let mut order = Order::new(Uuid::new_v4(), Some(Uuid::new_v4()), "h@h.test");
        order.status = OrderStatus::Delivery;
        order.delivery_address = Some("Herzl 1, Tel Aviv".into());
        order.delivery_price = dec!(30);

        let mut supplied = OrderItem::new(Uuid::new_v4(), "Apples", dec!(9.90), dec!(2));
        supplied.actual_quantity = Some(dec!(2));
        supplied.shopped = true;

        let mut missing = OrderItem::new(Uuid::new_v4(), "Tahini", dec!(4), dec!(3));
        missing.shopped = true;
        missing.available = false;
        missing.substitute_product_name = Some("Other tahini".into());

        let mut zero = OrderItem::new(Uuid::new_v4(), "Dates", dec!(12.5), dec!(1));
        zero.actual_quantity = Some(Decimal::ZERO);

        order.items = vec![supplied, missing, zero];
        order
    }

    #[test]
    fn follow_up_carries_only_unsupplied_items() {
        let shipped = shipped_order();
        let now = Utc::now();
        let follow_up = build_follow_up(&shipped, now).unwrap().unwrap();

        assert_eq!(follow_up.status, OrderStatus::FollowUp);
        assert_eq!(follow_up.items.len(), 2);
        assert_eq!(follow_up.items[0].product_name, "Tahini");
        assert_eq!(follow_up.items[1].product_name, "Dates");
        assert_eq!(follow_up.total_amount, dec!(24.5));
        assert_eq!(follow_up.delivery_price, Decimal::ZERO);
        assert_eq!(follow_up.vendor_id, shipped.vendor_id);
        assert_eq!(follow_up.household_id, shipped.household_id);
        assert_eq!(follow_up.delivery_address, shipped.delivery_address);
        assert!(follow_up.id.is_nil());

        for item in &follow_up.items {
            assert!(!item.shopped);
            assert!(item.available);
            assert!(!item.modified);
            assert_eq!(item.actual_quantity, None);
            assert_eq!(item.substitute_product_name, None);
        }
    }

    #[test]
    fn fully_supplied_order_needs_no_follow_up() {
        let mut shipped = shipped_order();
        for item in &mut shipped.items {
            item.actual_quantity = Some(item.quantity);
        }
        assert!(build_follow_up(&shipped, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn follow_up_total_overflow_is_an_error() {
        let mut shipped = shipped_order();
        shipped.items[1].price = Decimal::MAX;
        assert!(matches!(
            build_follow_up(&shipped, Utc::now()),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
