use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{Query, Record, RecordStore, StoreError};

#[derive(Debug, Clone)]
struct Slot<R> {
    seq: u64,
    record: R,
}

/// Process-local store. Unsorted queries return records in insertion order.
#[derive(Debug)]
pub struct InMemoryStore<R: Record> {
    records: DashMap<Uuid, Slot<R>>,
    next_seq: AtomicU64,
}

impl<R: Record> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> InMemoryStore<R> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Seeds the store without touching timestamps.
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: R) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.records.insert(record.id(), Slot { seq, record });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every record in insertion order.
    pub fn snapshot(&self) -> Vec<R> {
        let mut slots: Vec<Slot<R>> = self.records.iter().map(|e| e.value().clone()).collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.record).collect()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryStore<R> {
    async fn get(&self, id: Uuid) -> Result<R, StoreError> {
        self.records
            .get(&id)
            .map(|slot| slot.record.clone())
            .ok_or_else(|| StoreError::NotFound {
                collection: R::COLLECTION,
                id: id.to_string(),
            })
    }

    async fn filter(&self, query: &Query<R>) -> Result<Vec<R>, StoreError> {
        Ok(query.apply(self.snapshot()))
    }

    async fn create(&self, mut record: R) -> Result<R, StoreError> {
        if record.id().is_nil() {
            record.set_id(Uuid::new_v4());
        }
        if self.records.contains_key(&record.id()) {
            return Err(StoreError::Rejected(format!(
                "{} {} already exists",
                R::COLLECTION,
                record.id()
            )));
        }
        record.touch();
        self.insert(record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, patch: R::Patch) -> Result<R, StoreError> {
        let mut slot = self
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                collection: R::COLLECTION,
                id: id.to_string(),
            })?;
        slot.record.apply(&patch);
        slot.record.touch();
        Ok(slot.record.clone())
    }
}
