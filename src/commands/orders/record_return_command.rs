use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    metrics::RETURNS_RECORDED,
    models::Order,
    store::OrderPatch,
};

/// Records how much of an item came back; the amount must be positive and
/// no more than was supplied.
///
/// The order's `total_amount` is left alone: the credit is billed as a
/// separate virtual return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordReturnCommand {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub amount_returned: Decimal,
}

#[async_trait::async_trait]
impl Command for RecordReturnCommand {
    type Result = Order;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id, product_id = %self.product_id))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        if self.amount_returned <= Decimal::ZERO {
            return Err(ServiceError::validation(format!(
                "returned amount {} must be positive",
                self.amount_returned
            )));
        }

        let mut order = ctx.load_order(self.order_id).await?;
        let item = order
            .items
            .iter_mut()
            .find(|item| item.product_id == self.product_id)
            .ok_or_else(|| {
                ServiceError::validation(format!(
                    "product {} is not on order {}",
                    self.product_id, self.order_id
                ))
            })?;

        let supplied = item.effective_quantity();
        if self.amount_returned > supplied {
            return Err(ServiceError::validation(format!(
                "cannot return {} of product {}; only {} supplied",
                self.amount_returned, self.product_id, supplied
            )));
        }
        item.amount_returned = self.amount_returned;
        item.is_returned = true;
        order.refresh_return_flag();

        let patch = OrderPatch {
            has_returned_item: Some(order.has_returned_item),
            items: Some(order.items),
            ..OrderPatch::default()
        };
        let updated = ctx.update_order("record_return", self.order_id, patch).await?;
        RETURNS_RECORDED.inc();
        info!(
            order_id = %self.order_id,
            returned_value = %updated.returned_value(),
            "Return recorded"
        );
        Ok(updated)
    }
}
