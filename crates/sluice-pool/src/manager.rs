//! Pool manager — owns the live worker set and resizes it to a target.
//!
//! Every structural change goes through [`PoolManager::set_target`], which
//! holds the pool lock for its whole read-modify-write, so concurrent
//! resizes are applied one at a time.
//!
//! Shrinking stops the highest worker ids first (the most recently
//! started). Stopped workers leave the live set immediately; their tasks are
//! kept on a retired list until they reach `Stopped` so shutdown can wait
//! for them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::handler::RecordHandler;
use crate::queue::RecordQueue;
use crate::worker::{WorkerExit, WorkerHandle, WorkerId};

struct PoolState {
    workers: BTreeMap<WorkerId, WorkerHandle>,
    /// Signalled to stop, not yet joined.
    retired: Vec<WorkerHandle>,
    next_id: WorkerId,
    /// Set by `shutdown`; later resizes are refused.
    stopped: bool,
}

pub struct PoolManager {
    queue: Arc<RecordQueue>,
    handler: Arc<RecordHandler>,
    max_workers: usize,
    state: Mutex<PoolState>,
    /// Worker tasks that have not yet returned, retired ones included.
    live: Arc<AtomicUsize>,
}

impl PoolManager {
    pub fn new(queue: Arc<RecordQueue>, handler: Arc<RecordHandler>, max_workers: usize) -> Self {
        Self {
            queue,
            handler,
            max_workers,
            state: Mutex::new(PoolState {
                workers: BTreeMap::new(),
                retired: Vec::new(),
                next_id: 1,
                stopped: false,
            }),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Grow or shrink the pool to `target` workers and return the new size.
    ///
    /// Targets above `max_workers` are clamped.
    pub async fn set_target(&self, target: usize) -> usize {
        let target = if target > self.max_workers {
            warn!(
                requested = target,
                max_workers = self.max_workers,
                "target above max_workers, clamping"
            );
            self.max_workers
        } else {
            target
        };

        let mut state = self.state.lock().await;
        if state.stopped {
            warn!(target, "pool is shut down, ignoring resize");
            return 0;
        }
        reap_finished(&mut state.retired);

        let current = state.workers.len();
        if target > current {
            for _ in current..target {
                let id = state.next_id;
                state.next_id += 1;
                let worker = WorkerHandle::spawn(
                    id,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.handler),
                    Arc::clone(&self.live),
                );
                state.workers.insert(id, worker);
                info!(worker_id = id, "added worker");
            }
        } else if target < current {
            for _ in target..current {
                if let Some((id, worker)) = state.workers.pop_last() {
                    worker.request_stop();
                    state.retired.push(worker);
                    info!(worker_id = id, "removed worker");
                }
            }
        }

        let size = state.workers.len();
        if size != current {
            debug!(from = current, to = size, "pool resized");
        }
        size
    }

    /// Registered workers (the requested size).
    pub async fn size(&self) -> usize {
        self.state.lock().await.workers.len()
    }

    pub async fn worker_ids(&self) -> Vec<WorkerId> {
        self.state.lock().await.workers.keys().copied().collect()
    }

    /// Worker tasks still running, including stopped-but-finishing ones.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Drop retired handles whose tasks have already returned.
    pub async fn reap(&self) -> usize {
        reap_finished(&mut self.state.lock().await.retired)
    }

    /// Wait for every retired worker to reach `Stopped`.
    pub async fn await_retired(&self) -> Vec<WorkerExit> {
        let retired = std::mem::take(&mut self.state.lock().await.retired);
        join_all(retired).await
    }

    /// Stop every worker and wait for them. Idempotent.
    ///
    /// Workers finish the record in hand; records still queued stay queued.
    pub async fn shutdown(&self) -> Vec<WorkerExit> {
        let retired = {
            let mut state = self.state.lock().await;
            state.stopped = true;
            let workers = std::mem::take(&mut state.workers);
            for worker in workers.into_values() {
                worker.request_stop();
                state.retired.push(worker);
            }
            std::mem::take(&mut state.retired)
        };

        let exits = join_all(retired).await;
        info!(workers = exits.len(), "worker pool stopped");
        exits
    }
}

fn reap_finished(retired: &mut Vec<WorkerHandle>) -> usize {
    let before = retired.len();
    retired.retain(|worker| !worker.is_finished());
    before - retired.len()
}

async fn join_all(workers: Vec<WorkerHandle>) -> Vec<WorkerExit> {
    let mut exits = Vec::with_capacity(workers.len());
    for worker in workers {
        let id = worker.id();
        match worker.join().await {
            Ok(exit) => exits.push(exit),
            Err(e) => error!(worker_id = id, error = %e, "worker task failed"),
        }
    }
    exits
}
