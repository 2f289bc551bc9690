use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    models::Order,
    services::totals::{compute_total, TotalPolicy},
    store::OrderPatch,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub product_id: Uuid,
    pub price: Decimal,
}

/// Manual price edit. Persists the items and re-syncs the cached total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItemPricesCommand {
    pub order_id: Uuid,
    pub changes: Vec<PriceChange>,
}

#[async_trait::async_trait]
impl Command for UpdateItemPricesCommand {
    type Result = Order;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id, changes = self.changes.len()))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        if let Some(bad) = self.changes.iter().find(|c| c.price < Decimal::ZERO) {
            return Err(ServiceError::validation(format!(
                "negative price {} for product {}",
                bad.price, bad.product_id
            )));
        }

        let mut order = ctx.load_order(self.order_id).await?;
        for change in &self.changes {
            let mut matched = false;
            for item in order
                .items
                .iter_mut()
                .filter(|item| item.product_id == change.product_id)
            {
                item.price = change.price;
                item.modified = true;
                matched = true;
            }
            if !matched {
                return Err(ServiceError::validation(format!(
                    "product {} is not on order {}",
                    change.product_id, self.order_id
                )));
            }
        }
        let total_amount = compute_total(&order, TotalPolicy::AllItems)?;

        let patch = OrderPatch {
            items: Some(order.items),
            total_amount: Some(total_amount),
            ..OrderPatch::default()
        };
        let updated = ctx
            .update_order("update_item_prices", self.order_id, patch)
            .await?;
        info!(order_id = %self.order_id, total = %updated.total_amount, "Item prices updated");
        Ok(updated)
    }
}
