use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    commands::{
        orders::{
            PriceChange, RecordReturnCommand, UpdateDeliveryTimeCommand, UpdateDeliveryTimeResult,
            UpdateItemPricesCommand, UpdatePaymentCommand,
        },
        Command, CommandContext,
    },
    errors::ServiceError,
    models::{Order, PaymentMethod, PaymentStatus},
};

/// Payment fields to change; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub is_paid: Option<bool>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
}

/// Direct field edits that bypass the status state machine.
#[derive(Clone)]
pub struct OrderService {
    ctx: CommandContext,
}

impl OrderService {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.ctx.load_order(order_id).await
    }

    #[instrument(skip(self, update))]
    pub async fn update_payment(
        &self,
        order_id: Uuid,
        update: PaymentUpdate,
    ) -> Result<Order, ServiceError> {
        UpdatePaymentCommand {
            order_id,
            is_paid: update.is_paid,
            payment_status: update.payment_status,
            payment_method: update.payment_method,
            added_to_bill: None,
        }
        .execute(&self.ctx)
        .await
    }

    #[instrument(skip(self))]
    pub async fn set_added_to_bill(
        &self,
        order_id: Uuid,
        added_to_bill: bool,
    ) -> Result<Order, ServiceError> {
        UpdatePaymentCommand {
            order_id,
            added_to_bill: Some(added_to_bill),
            ..UpdatePaymentCommand::default()
        }
        .execute(&self.ctx)
        .await
    }

    /// Persists a new delivery window and tells the customer, best effort.
    #[instrument(skip(self))]
    pub async fn update_delivery_time(
        &self,
        order_id: Uuid,
        delivery_time: &str,
    ) -> Result<UpdateDeliveryTimeResult, ServiceError> {
        UpdateDeliveryTimeCommand {
            order_id,
            delivery_time: delivery_time.to_string(),
        }
        .execute(&self.ctx)
        .await
    }

    #[instrument(skip(self, changes))]
    pub async fn update_item_prices(
        &self,
        order_id: Uuid,
        changes: Vec<PriceChange>,
    ) -> Result<Order, ServiceError> {
        UpdateItemPricesCommand { order_id, changes }
            .execute(&self.ctx)
            .await
    }

    #[instrument(skip(self))]
    pub async fn record_return(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        amount_returned: Decimal,
    ) -> Result<Order, ServiceError> {
        RecordReturnCommand {
            order_id,
            product_id,
            amount_returned,
        }
        .execute(&self.ctx)
        .await
    }
}
