//! The persistence seam between the worker pool and storage.

use std::sync::Mutex;

use async_trait::async_trait;

use sluice_core::Record;

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;

/// Accepts records the pool decided to persist.
///
/// Implementations report success or failure; callers never retry.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, record: &Record) -> StoreResult<()>;
}

/// The insert runs on the blocking pool. Dropping the returned future does
/// not cancel it, so a caller that gives up waiting may still see the record
/// committed.
#[async_trait]
impl RecordSink for RecordStore {
    async fn persist(&self, record: &Record) -> StoreResult<()> {
        let store = self.clone();
        let record = record.clone();
        // redb commits are synchronous disk writes.
        tokio::task::spawn_blocking(move || store.insert(&record))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(())
    }
}

/// In-process sink that keeps every persisted record in a vector.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far, in persist order.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn persist(&self, record: &Record) -> StoreResult<()> {
        self.records
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .push(record.clone());
        Ok(())
    }
}
