//! Shared pacing and cancellation for bulk operations.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::errors::ServiceError;

/// How bulk operations issue their per-item remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSettings {
    /// Delay before each item after the first.
    pub pacing: Duration,
    /// Items in flight at once; `1` is sequential.
    pub concurrency: usize,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(500),
            concurrency: 1,
        }
    }
}

impl BulkSettings {
    pub fn unpaced(concurrency: usize) -> Self {
        Self {
            pacing: Duration::ZERO,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Waits out the pacing delay for item `index`, then runs `call`. Returns
/// `Cancelled` without starting the call once `cancel` has fired; a call that
/// already started runs to completion.
pub async fn paced<T, F>(
    index: usize,
    pacing: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }
    if index > 0 && !pacing.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(pacing) => {}
            _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
        }
    }
    call.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn cancelled_token_skips_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = paced(0, Duration::ZERO, &cancel, async { Ok(1) }).await;
        assert_matches!(result, Err(ServiceError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pacing_stops_before_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let result = paced(1, Duration::from_secs(10), &cancel, async { Ok(1) }).await;
        assert_matches!(result, Err(ServiceError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn first_item_is_not_delayed() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let value = paced(0, Duration::from_secs(5), &cancel, async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
