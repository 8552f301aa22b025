//! sluice-store — durable storage for persisted records.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for records the worker pool decided to keep, plus the
//! "most recent N" query used by reporting.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value column under an
//! auto-incrementing `u64` key, so iteration order is insertion order.
//!
//! The worker pool only sees the [`RecordSink`] trait. [`RecordStore`] is
//! `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and implements it
//! by moving each write onto the blocking thread pool. [`MemorySink`] keeps
//! records in a vector.

pub mod error;
pub mod sink;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use sink::{MemorySink, RecordSink};
pub use store::{RecordStore, StoredRecord};
