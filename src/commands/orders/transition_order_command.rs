use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    models::Order,
    services::order_status::{ensure_transition, OrderEvent},
    store::OrderPatch,
};

/// Status transitions that carry no side effects: start processing, mark
/// ready, mark delivered and uncancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOrderCommand {
    pub order_id: Uuid,
    pub event: OrderEvent,
}

impl TransitionOrderCommand {
    pub fn new(order_id: Uuid, event: OrderEvent) -> Self {
        Self { order_id, event }
    }
}

#[async_trait::async_trait]
impl Command for TransitionOrderCommand {
    type Result = Order;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id, event = %self.event))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        if matches!(self.event, OrderEvent::Ship | OrderEvent::Cancel) {
            return Err(ServiceError::InvalidOperation(format!(
                "{} has side effects and must go through its own command",
                self.event
            )));
        }

        let order = ctx.load_order(self.order_id).await?;
        let to = ensure_transition(&order, self.event)?;

        let updated = ctx
            .update_order("update_status", self.order_id, OrderPatch::status(to))
            .await
            .map_err(|e| {
                error!(order_id = %self.order_id, error = %e, "Failed to update order status");
                e
            })?;

        info!(
            order_id = %self.order_id,
            from = %order.status,
            to = %updated.status,
            "Order status updated"
        );
        Ok(updated)
    }
}
