//! RecordStore — redb-backed persistence for Sluice records.
//!
//! Provides append and query operations over persisted records. Values are
//! JSON-serialized into redb's `&[u8]` value column. The store supports both
//! on-disk and in-memory backends (the latter for testing and for running
//! without a data directory).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use tracing::debug;

use sluice_core::Record;

use crate::error::{StoreError, StoreResult};
use crate::tables::RECORDS;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// A record together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: u64,
    pub record: Record,
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Open (or create) a persistent record store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory record store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Append a record and return the id assigned to it.
    ///
    /// Ids start at 1 and increase by one per insert.
    pub fn insert(&self, record: &Record) -> StoreResult<u64> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            id = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(1);
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id, severity = %record.severity, "record stored");
        Ok(id)
    }

    /// Get a record by id.
    pub fn get(&self, id: u64) -> StoreResult<Option<StoredRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: Record =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(StoredRecord { id, record }))
            }
            None => Ok(None),
        }
    }

    /// The `limit` most recently stored records, newest first.
    pub fn recent(&self, limit: usize) -> StoreResult<Vec<StoredRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::with_capacity(limit);
        for entry in table.iter().map_err(map_err!(Read))?.rev().take(limit) {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let record: Record =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(StoredRecord {
                id: key.value(),
                record,
            });
        }
        Ok(results)
    }

    /// Number of stored records.
    pub fn count(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }
}
