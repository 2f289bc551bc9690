use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    commands::{Command, CommandContext},
    errors::ServiceError,
    metrics::{ORDERS_REPRICED, REPRICE_FAILURES},
    models::Order,
    services::reconciliation::{reconcile_order, PriceCatalog},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Updated { order: Order },
    /// Prices and delivery fee already matched the catalog; nothing written.
    Unchanged { order_id: Uuid },
}

impl ReconcileOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, ReconcileOutcome::Updated { .. })
    }
}

/// Re-syncs one order's item prices and delivery fee with the catalog.
#[derive(Debug, Clone)]
pub struct ReconcileOrderPricesCommand {
    pub order_id: Uuid,
    pub catalog: Arc<PriceCatalog>,
}

impl ReconcileOrderPricesCommand {
    pub fn new(order_id: Uuid, catalog: Arc<PriceCatalog>) -> Self {
        Self { order_id, catalog }
    }

    /// Reconciles an order the caller already holds, skipping the read.
    pub async fn execute_for(
        &self,
        order: &Order,
        ctx: &CommandContext,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let patch = reconcile_order(order, &self.catalog).map_err(|e| {
            REPRICE_FAILURES.inc();
            e
        })?;
        let Some(patch) = patch else {
            debug!(order_id = %order.id, "Order already matches catalog");
            return Ok(ReconcileOutcome::Unchanged { order_id: order.id });
        };

        let updated = ctx
            .update_order("reconcile_prices", order.id, patch)
            .await
            .map_err(|e| {
                REPRICE_FAILURES.inc();
                e
            })?;
        ORDERS_REPRICED.inc();
        info!(
            order_id = %updated.id,
            total = %updated.total_amount,
            delivery_price = %updated.delivery_price,
            "Order prices reconciled"
        );
        Ok(ReconcileOutcome::Updated { order: updated })
    }
}

#[async_trait::async_trait]
impl Command for ReconcileOrderPricesCommand {
    type Result = ReconcileOutcome;

    #[instrument(skip(self, ctx), fields(order_id = %self.order_id))]
    async fn execute(&self, ctx: &CommandContext) -> Result<Self::Result, ServiceError> {
        let order = ctx.load_order(self.order_id).await?;
        self.execute_for(&order, ctx).await
    }
}
