//! Worker — a cancellable task draining the shared queue.
//!
//! Lifecycle:
//!
//! ```text
//! Running ──stop signal──► StopRequested ──safe point──► Stopped
//! ```
//!
//! The stop signal is honored only between records: at the top of each
//! loop iteration and while parked on an empty queue. A record already
//! dequeued is always handled to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::handler::RecordHandler;
use crate::queue::RecordQueue;

/// Unique worker identifier. Allocated by the pool manager, never reused.
pub type WorkerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    StopRequested,
    Stopped,
}

/// Why a worker task returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Its handle signalled stop.
    Cancelled,
    /// The queue was closed and fully drained.
    QueueClosed,
}

/// Returned by a worker task when it reaches `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub id: WorkerId,
    /// Records this worker handled over its lifetime.
    pub handled: u64,
    pub reason: ExitReason,
}

/// Owned by the pool manager: the capability to stop one worker.
pub struct WorkerHandle {
    id: WorkerId,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    /// Spawn a worker bound to the shared queue and handler.
    ///
    /// `live` is incremented now and decremented when the task ends, however
    /// it ends.
    pub(crate) fn spawn(
        id: WorkerId,
        queue: Arc<RecordQueue>,
        handler: Arc<RecordHandler>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let guard = LiveGuard::new(live);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            run_worker(id, queue, handler, shutdown_rx).await
        });
        Self {
            id,
            shutdown_tx,
            handle,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Ask the worker to stop at its next safe point.
    pub fn request_stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn state(&self) -> WorkerState {
        if self.handle.is_finished() {
            WorkerState::Stopped
        } else if *self.shutdown_tx.borrow() {
            WorkerState::StopRequested
        } else {
            WorkerState::Running
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to reach `Stopped`.
    pub async fn join(self) -> Result<WorkerExit, tokio::task::JoinError> {
        self.handle.await
    }
}

/// Keeps the pool's live-task counter honest, including on panic.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_worker(
    id: WorkerId,
    queue: Arc<RecordQueue>,
    handler: Arc<RecordHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerExit {
    debug!(worker_id = id, "worker started");
    let mut handled = 0;

    let reason = loop {
        // Safe point: between records.
        if *shutdown.borrow_and_update() {
            break ExitReason::Cancelled;
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                // A dropped handle counts as a stop request.
                if changed.is_err() {
                    break ExitReason::Cancelled;
                }
            }
            record = queue.dequeue() => match record {
                Some(record) => {
                    handler.handle(id, record).await;
                    handled += 1;
                }
                None => break ExitReason::QueueClosed,
            },
        }
    };

    info!(worker_id = id, handled, ?reason, "worker stopped");
    WorkerExit {
        id,
        handled,
        reason,
    }
}
