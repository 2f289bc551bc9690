use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    models::{Order, OrderStatus},
    store::OrderPatch,
};

/// Sets any status directly. No transition check, no notification, no
/// follow-up order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideOrderStatusCommand {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

#[async_trait::async_trait]
impl Command for OverrideOrderStatusCommand {
    type Result = Order;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id, status = %self.status))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        let updated = ctx
            .update_order("override_status", self.order_id, OrderPatch::status(self.status))
            .await?;
        warn!(
            order_id = %self.order_id,
            status = %self.status,
            "Status overridden; no notifications or automations triggered"
        );
        Ok(updated)
    }
}
