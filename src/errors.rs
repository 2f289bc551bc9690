use serde::Serialize;
use uuid::Uuid;

use crate::store::StoreError;

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed input rejected before any mutation.
    Validation,
    /// Store, renderer or other remote collaborator failed.
    Remote,
    /// Operation was stopped by the caller.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid transition for order {order_id}: cannot {event} from {from}")]
    InvalidTransition {
        order_id: Uuid,
        from: String,
        event: String,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Store error during {operation} on {record_id}: {source}")]
    StoreError {
        operation: &'static str,
        record_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Timed out during {operation} on {record_id}")]
    Timeout {
        operation: &'static str,
        record_id: String,
    },

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Wraps a store failure with the operation and record it concerned, so the
    /// initiating caller can retry by hand.
    pub fn store(operation: &'static str, record_id: impl ToString, source: StoreError) -> Self {
        match source {
            StoreError::NotFound { collection, id } => {
                ServiceError::NotFound(format!("{} {} not found", collection, id))
            }
            source => ServiceError::StoreError {
                operation,
                record_id: record_id.to_string(),
                source,
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::ValidationError(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidOperation(_)
            | Self::NotFound(_) => ErrorCategory::Validation,
            Self::StoreError { .. }
            | Self::Timeout { .. }
            | Self::RenderError(_) => ErrorCategory::Remote,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// One item of a batch that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub order_id: Uuid,
    pub category: ErrorCategory,
    pub error: String,
}

impl BatchFailure {
    pub fn new(order_id: Uuid, error: &ServiceError) -> Self {
        Self {
            order_id,
            category: error.category(),
            error: error.to_string(),
        }
    }
}

/// Outcome of a bulk operation. A per-item failure is recorded here and the
/// batch carries on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub updated: usize,
    /// Items that needed no write.
    pub skipped: usize,
    pub failed: Vec<BatchFailure>,
    /// Items never started because the batch was cancelled.
    pub not_attempted: usize,
}

impl BatchTally {
    pub fn record_failure(&mut self, order_id: Uuid, error: &ServiceError) {
        match error {
            ServiceError::Cancelled => self.not_attempted += 1,
            other => self.failed.push(BatchFailure::new(order_id, other)),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn was_cancelled(&self) -> bool {
        self.not_attempted > 0
    }

    pub fn total(&self) -> usize {
        self.updated + self.skipped + self.failed.len() + self.not_attempted
    }
}
