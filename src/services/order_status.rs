//! Order status state machine.
//!
//! | from                    | event            | to                   |
//! |-------------------------|------------------|----------------------|
//! | pending, follow_up      | start processing | shopping             |
//! | shopping                | mark ready       | ready_for_shipping   |
//! | ready_for_shipping      | ship             | delivery             |
//! | delivery                | mark delivered   | delivered            |
//! | any non-terminal        | cancel           | cancelled            |
//! | cancelled               | uncancel         | pending              |
//!
//! Shipping also notifies the customer and synthesizes a follow-up order for
//! unsupplied items. An admin override may set any status without side effects.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    commands::{
        orders::{
            CancelOrderCommand, OverrideOrderStatusCommand, ShipOrderCommand, ShipOrderResult,
            TransitionOrderCommand,
        },
        Command, CommandContext,
    },
    errors::ServiceError,
    models::{Order, OrderStatus},
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderEvent {
    StartProcessing,
    MarkReady,
    Ship,
    MarkDelivered,
    Cancel,
    Uncancel,
}

/// Target status for `event` from `from`, or `None` when the transition is not
/// allowed.
pub fn next_status(from: OrderStatus, event: OrderEvent) -> Option<OrderStatus> {
    use OrderEvent::*;
    use OrderStatus::*;

    match (from, event) {
        (Pending | FollowUp, StartProcessing) => Some(Shopping),
        (Shopping, MarkReady) => Some(ReadyForShipping),
        (ReadyForShipping, Ship) => Some(Delivery),
        (Delivery, MarkDelivered) => Some(Delivered),
        (status, Cancel) if !status.is_terminal() => Some(Cancelled),
        (Cancelled, Uncancel) => Some(Pending),
        _ => None,
    }
}

/// Like [`next_status`] but reports a rejected transition as an error.
pub fn ensure_transition(order: &Order, event: OrderEvent) -> Result<OrderStatus, ServiceError> {
    next_status(order.status, event).ok_or_else(|| ServiceError::InvalidTransition {
        order_id: order.id,
        from: order.status.to_string(),
        event: event.to_string(),
    })
}

/// Events an operator may trigger on an order in `status`.
pub fn available_events(status: OrderStatus) -> Vec<OrderEvent> {
    OrderEvent::iter()
        .filter(|event| next_status(status, *event).is_some())
        .collect()
}

/// Facade over the status commands.
#[derive(Clone)]
pub struct OrderStatusService {
    ctx: CommandContext,
}

impl OrderStatusService {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn start_processing(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        TransitionOrderCommand::new(order_id, OrderEvent::StartProcessing)
            .execute(&self.ctx)
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_ready(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        TransitionOrderCommand::new(order_id, OrderEvent::MarkReady)
            .execute(&self.ctx)
            .await
    }

    #[instrument(skip(self))]
    pub async fn ship(&self, order_id: Uuid) -> Result<ShipOrderResult, ServiceError> {
        ShipOrderCommand { order_id }.execute(&self.ctx).await
    }

    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        TransitionOrderCommand::new(order_id, OrderEvent::MarkDelivered)
            .execute(&self.ctx)
            .await
    }

    /// Cancels after the operator confirmed the prompt.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: Uuid, confirmed: bool) -> Result<Order, ServiceError> {
        CancelOrderCommand {
            order_id,
            confirmed,
        }
        .execute(&self.ctx)
        .await
    }

    #[instrument(skip(self))]
    pub async fn uncancel(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        TransitionOrderCommand::new(order_id, OrderEvent::Uncancel)
            .execute(&self.ctx)
            .await
    }

    /// Admin escape hatch: sets any status, triggers no notification or
    /// automation.
    #[instrument(skip(self))]
    pub async fn override_status(
        &self,
        order_id: Uuid,
        status: &str,
    ) -> Result<Order, ServiceError> {
        let status = OrderStatus::from_str(status).map_err(|_| {
            ServiceError::validation(format!("Invalid status: {}", status))
        })?;
        OverrideOrderStatusCommand { order_id, status }
            .execute(&self.ctx)
            .await
    }
}
