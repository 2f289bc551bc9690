use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    models::{Order, PaymentMethod, PaymentStatus},
    store::OrderPatch,
};

/// Direct edit of the payment bookkeeping flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePaymentCommand {
    pub order_id: Uuid,
    pub is_paid: Option<bool>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub added_to_bill: Option<bool>,
}

#[async_trait::async_trait]
impl Command for UpdatePaymentCommand {
    type Result = Order;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        let patch = OrderPatch {
            is_paid: self.is_paid,
            payment_status: self.payment_status,
            payment_method: self.payment_method,
            added_to_bill: self.added_to_bill,
            ..OrderPatch::default()
        };
        if patch.is_empty() {
            return Err(ServiceError::validation(format!(
                "no payment fields given for order {}",
                self.order_id
            )));
        }

        let updated = ctx
            .update_order("update_payment", self.order_id, patch)
            .await?;
        info!(
            order_id = %self.order_id,
            is_paid = updated.is_paid,
            payment_status = %updated.payment_status,
            added_to_bill = updated.added_to_bill,
            "Payment fields updated"
        );
        Ok(updated)
    }
}
