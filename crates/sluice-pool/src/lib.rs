//! sluice-pool — bounded record queue and a resizable pool of workers.
//!
//! ```text
//!  producers ──enqueue──► RecordQueue ──dequeue──► worker 1 ─┐
//!                          (bounded)   ──dequeue──► worker 2 ─┼─► RecordHandler
//!                                      ──dequeue──► worker N ─┘    ├─ persist (≥ severity)
//!                                                                  ├─ alert observe
//!                              PoolManager::set_target(n)          └─ trace event
//!                              (serialized, ids never reused)
//! ```
//!
//! # Modules
//!
//! - **`queue`** — [`RecordQueue`], FIFO with a block/drop overflow policy
//! - **`handler`** — [`RecordHandler`], what a worker does with one record
//! - **`worker`** — [`WorkerHandle`], one cancellable worker task
//! - **`manager`** — [`PoolManager`], the registry and its resize operation

pub mod error;
pub mod handler;
pub mod manager;
pub mod queue;
pub mod worker;

pub use error::QueueError;
pub use handler::{HandlerSnapshot, HandlerStats, RecordHandler};
pub use manager::PoolManager;
pub use queue::RecordQueue;
pub use worker::{ExitReason, WorkerExit, WorkerHandle, WorkerId, WorkerState};
