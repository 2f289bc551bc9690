use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    models::Order,
    notifications::{MessageType, RecipientType},
    store::OrderPatch,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateDeliveryTimeCommand {
    pub order_id: Uuid,
    #[validate(custom = "validate_delivery_time")]
    pub delivery_time: String,
}

/// Length rules apply to the trimmed value, which is what gets stored.
fn validate_delivery_time(value: &str) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if !(1..=200).contains(&len) {
        let mut err = ValidationError::new("delivery_time_length");
        err.message = Some("Delivery time must be between 1 and 200 characters".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateDeliveryTimeResult {
    pub order: Order,
    pub customer_notified: bool,
}

#[async_trait::async_trait]
impl Command for UpdateDeliveryTimeCommand {
    type Result = UpdateDeliveryTimeResult;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        self.validate()?;

        let patch = OrderPatch {
            delivery_time: Some(self.delivery_time.trim().to_string()),
            ..OrderPatch::default()
        };
        let order = ctx
            .update_order("update_delivery_time", self.order_id, patch)
            .await?;
        info!(order_id = %self.order_id, delivery_time = %self.delivery_time, "Delivery time updated");

        let customer_notified = ctx
            .notify(order.id, MessageType::DeliveryTimeChanged, RecipientType::Customer)
            .await;

        Ok(UpdateDeliveryTimeResult {
            order,
            customer_notified,
        })
    }
}
