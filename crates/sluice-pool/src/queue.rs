//! Bounded FIFO record queue shared by producers and workers.
//!
//! Wraps a tokio `mpsc` channel. The receiving half sits behind its own
//! async mutex so any number of workers can drain it; that lock is never
//! the pool lock. Depth is derived from the sender's free permits, so it is
//! readable without consuming or blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, warn};

use sluice_core::Record;
use sluice_core::config::{OverflowPolicy, QueueConfig};

use crate::error::QueueError;

pub struct RecordQueue {
    tx: mpsc::Sender<Record>,
    rx: Arc<Mutex<mpsc::Receiver<Record>>>,
    capacity: usize,
    policy: OverflowPolicy,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    dropped: AtomicU64,
}

impl RecordQueue {
    /// Create a queue holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (validated away by `SluiceConfig`).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
            policy,
            closed_tx,
            closed_rx,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.capacity, config.overflow)
    }

    /// Add a record, applying the queue's overflow policy when full.
    ///
    /// Under [`OverflowPolicy::Block`] this waits for a free slot, or until
    /// the queue is closed. Under [`OverflowPolicy::Drop`] a full queue
    /// discards the record and returns [`QueueError::Full`].
    pub async fn enqueue(&self, record: Record) -> Result<(), QueueError> {
        match self.policy {
            OverflowPolicy::Block => {
                let mut closed = self.closed_rx.clone();
                if *closed.borrow_and_update() {
                    return Err(QueueError::Closed);
                }
                let permit = tokio::select! {
                    permit = self.tx.reserve() => permit.map_err(|_| QueueError::Closed)?,
                    _ = closed.changed() => return Err(QueueError::Closed),
                };

                // Holding the flag's read lock keeps `close` from landing
                // between the check and the send.
                let flag = self.closed_rx.borrow();
                if *flag {
                    return Err(QueueError::Closed);
                }
                permit.send(record);
                Ok(())
            }
            OverflowPolicy::Drop => self.try_enqueue(record),
        }
    }

    /// Add a record without waiting, whatever the policy.
    pub fn try_enqueue(&self, record: Record) -> Result<(), QueueError> {
        let sent = {
            let flag = self.closed_rx.borrow();
            if *flag {
                return Err(QueueError::Closed);
            }
            self.tx.try_send(record)
        };
        match sent {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(record)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    capacity = self.capacity,
                    severity = %record.severity,
                    origin = %record.origin,
                    dropped,
                    "queue full, record dropped"
                );
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Wait for the next record.
    ///
    /// Returns `None` once the queue is closed and every queued record has
    /// been handed out. Dropping the returned future before it completes
    /// never loses a record.
    pub async fn dequeue(&self) -> Option<Record> {
        let mut rx = self.rx.lock().await;
        let mut closed = self.closed_rx.clone();
        if *closed.borrow_and_update() {
            return rx.try_recv().ok();
        }
        tokio::select! {
            record = rx.recv() => record,
            _ = closed.changed() => rx.try_recv().ok(),
        }
    }

    /// Records currently waiting. Never exceeds [`capacity`](Self::capacity).
    pub fn depth(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Records discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting records. Records already queued stay drainable, and
    /// producers waiting for space get [`QueueError::Closed`].
    pub fn close(&self) {
        if !self.closed_tx.send_replace(true) {
            debug!(depth = self.depth(), "record queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}
