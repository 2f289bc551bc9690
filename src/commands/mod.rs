use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::Order,
    notifications::{dispatch_best_effort, MessageType, Notifier, RecipientType},
    store::{remote_call, OrderPatch, RecordStore},
};

pub mod orders;

/// Collaborators every command runs against.
#[derive(Clone)]
pub struct CommandContext {
    pub orders: Arc<dyn RecordStore<Order>>,
    pub notifier: Arc<dyn Notifier>,
    /// Deadline for each individual remote call.
    pub remote_timeout: Duration,
}

impl CommandContext {
    pub fn new(
        orders: Arc<dyn RecordStore<Order>>,
        notifier: Arc<dyn Notifier>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            orders,
            notifier,
            remote_timeout,
        }
    }

    pub async fn load_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        remote_call(
            self.remote_timeout,
            "get",
            order_id,
            self.orders.get(order_id),
        )
        .await
    }

    /// One remote update. On failure nothing is applied locally.
    pub async fn update_order(
        &self,
        operation: &'static str,
        order_id: Uuid,
        patch: OrderPatch,
    ) -> Result<Order, ServiceError> {
        remote_call(
            self.remote_timeout,
            operation,
            order_id,
            self.orders.update(order_id, patch),
        )
        .await
    }

    /// Best-effort notification bounded by `remote_timeout`. Returns whether
    /// it went out.
    pub async fn notify(
        &self,
        order_id: Uuid,
        message: MessageType,
        recipient: RecipientType,
    ) -> bool {
        dispatch_best_effort(
            self.notifier.as_ref(),
            self.remote_timeout,
            order_id,
            message,
            recipient,
        )
        .await
    }

    pub async fn create_order(&self, order: Order) -> Result<Order, ServiceError> {
        let number = order.order_number.clone();
        remote_call(
            self.remote_timeout,
            "create",
            number,
            self.orders.create(order),
        )
        .await
    }
}

/// Command trait for implementing the Command Pattern
///
/// Each business operation on an order is a single object that validates its
/// input, performs its remote calls and reports one terminal outcome.
#[async_trait]
pub trait Command: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError>;
}
