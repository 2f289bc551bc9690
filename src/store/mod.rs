//! Generic record-store seam.
//!
//! The hosted backend is reached through `get`/`filter`/`create`/`update`/`list`
//! on four collections. Nothing in the core depends on how a store is backed;
//! [`memory::InMemoryStore`] is used by tests and the CLI.

use std::{cmp::Ordering, future::Future, time::Duration};

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::ServiceError;

pub mod memory;
pub mod records;

pub use memory::InMemoryStore;
pub use records::OrderPatch;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} {id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// A record kept in one store collection.
pub trait Record: Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    /// Partial fields accepted by `update`.
    type Patch: Clone + Send + Sync + 'static;

    fn id(&self) -> Uuid;

    fn set_id(&mut self, id: Uuid);

    fn apply(&mut self, patch: &Self::Patch);

    /// Called by stores whenever a record is written.
    fn touch(&mut self) {}
}

pub type Predicate<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;
pub type Comparator<R> = Box<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

/// Filter, sort and page parameters for [`RecordStore::filter`].
pub struct Query<R> {
    predicate: Option<Predicate<R>>,
    sort: Option<Comparator<R>>,
    limit: Option<usize>,
    offset: usize,
}

impl<R> Default for Query<R> {
    fn default() -> Self {
        Self {
            predicate: None,
            sort: None,
            limit: None,
            offset: 0,
        }
    }
}

impl<R> Query<R> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(predicate: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Box::new(predicate)),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, cmp: impl Fn(&R, &R) -> Ordering + Send + Sync + 'static) -> Self {
        self.sort = Some(Box::new(cmp));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn matches(&self, record: &R) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(record))
    }

    /// Applies the predicate, sort and paging to an already-fetched list.
    pub fn apply(&self, records: Vec<R>) -> Vec<R> {
        let mut selected: Vec<R> = records.into_iter().filter(|r| self.matches(r)).collect();
        if let Some(cmp) = &self.sort {
            selected.sort_by(|a, b| cmp(a, b));
        }
        let paged = selected.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => paged.take(limit).collect(),
            None => paged.collect(),
        }
    }
}

#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<R, StoreError>;

    async fn filter(&self, query: &Query<R>) -> Result<Vec<R>, StoreError>;

    /// Persists a new record and returns it as stored.
    async fn create(&self, record: R) -> Result<R, StoreError>;

    async fn update(&self, id: Uuid, patch: R::Patch) -> Result<R, StoreError>;

    async fn list(&self) -> Result<Vec<R>, StoreError> {
        self.filter(&Query::all()).await
    }
}

/// Runs one remote call under a deadline so it always reaches a terminal
/// outcome, and attaches the operation and record to any failure.
pub async fn remote_call<T, F>(
    timeout: Duration,
    operation: &'static str,
    record_id: impl ToString,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ServiceError::store(operation, record_id, err)),
        Err(_) => Err(ServiceError::Timeout {
            operation,
            record_id: record_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn query_filters_sorts_and_pages() {
        let query = Query::filter(|n: &i32| n % 2 == 0)
            .sorted_by(|a, b| b.cmp(a))
            .offset(1)
            .limit(2);
        assert_eq!(query.apply(vec![1, 2, 3, 4, 5, 6, 8]), vec![6, 4]);
        assert_eq!(Query::<i32>::all().apply(vec![3, 1]), vec![3, 1]);
    }

    #[tokio::test]
    async fn remote_call_maps_failures() {
        let err = remote_call(Duration::from_secs(1), "update", "o-1", async {
            Err::<(), _>(StoreError::Unavailable("down".into()))
        })
        .await
        .unwrap_err();
        assert_matches!(err, ServiceError::StoreError { operation: "update", .. });
    }

    #[tokio::test(start_paused = true)]
    async fn remote_call_times_out() {
        let err = remote_call(Duration::from_millis(10), "get", "o-2", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap_err();
        assert_matches!(err, ServiceError::Timeout { operation: "get", .. });
    }
}
