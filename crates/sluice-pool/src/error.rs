//! Queue error types.

use thiserror::Error;

/// Errors returned by [`RecordQueue`](crate::RecordQueue) producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,

    #[error("queue is closed")]
    Closed,
}
