use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    metrics::ORDERS_CANCELLED,
    models::Order,
    services::order_status::{ensure_transition, OrderEvent},
    store::OrderPatch,
};

/// Cancels a non-terminal order. The operator must have confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderCommand {
    pub order_id: Uuid,
    pub confirmed: bool,
}

#[async_trait::async_trait]
impl Command for CancelOrderCommand {
    type Result = Order;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        if !self.confirmed {
            warn!(order_id = %self.order_id, "Cancellation attempted without confirmation");
            return Err(ServiceError::validation(format!(
                "cancelling order {} requires confirmation",
                self.order_id
            )));
        }

        let order = ctx.load_order(self.order_id).await?;
        let to = ensure_transition(&order, OrderEvent::Cancel)?;

        let updated = ctx
            .update_order("cancel", self.order_id, OrderPatch::status(to))
            .await
            .map_err(|e| {
                error!(order_id = %self.order_id, error = %e, "Failed to cancel order");
                e
            })?;

        ORDERS_CANCELLED.inc();
        info!(order_id = %self.order_id, from = %order.status, "Order cancelled");
        Ok(updated)
    }
}
