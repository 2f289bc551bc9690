//! Best-effort customer notifications (SMS on shipping and on delivery-window
//! changes).
//!
//! A failed or overdue notification is logged and dropped. It never fails the
//! operation that triggered it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    OrderShipped,
    DeliveryTimeChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientType {
    Customer,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        order_id: Uuid,
        message: MessageType,
        recipient: RecipientType,
    ) -> Result<(), NotificationError>;
}

/// Sends `message` and swallows any failure after logging it. A notifier that
/// has not answered within `timeout` counts as failed.
/// Returns whether the notification went out.
pub async fn dispatch_best_effort(
    notifier: &dyn Notifier,
    timeout: Duration,
    order_id: Uuid,
    message: MessageType,
    recipient: RecipientType,
) -> bool {
    let error = match tokio::time::timeout(timeout, notifier.notify(order_id, message, recipient))
        .await
    {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("no answer within {}s", timeout.as_secs()),
    };
    warn!(
        order_id = %order_id,
        message = %message,
        recipient = %recipient,
        error = %error,
        "Notification failed; continuing"
    );
    false
}

/// Notifier that only records the dispatch in the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        order_id: Uuid,
        message: MessageType,
        recipient: RecipientType,
    ) -> Result<(), NotificationError> {
        info!(order_id = %order_id, message = %message, recipient = %recipient, "notification");
        Ok(())
    }
}
