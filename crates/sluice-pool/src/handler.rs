//! Per-record handling shared by every worker.
//!
//! For each record: persist it if it is severe enough, report it to the
//! alert aggregator, and emit a trace event. Persistence is at-most-once:
//! a failed or timed-out persist is logged and counted, never retried and
//! never re-queued.
//!
//! A timed-out persist has an unknown outcome. The sink may still commit
//! the record after the worker has moved on, so timeouts are counted
//! apart from failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use sluice_alert::AlertHandle;
use sluice_core::config::PoolConfig;
use sluice_core::{ConfigError, Record, Severity};
use sluice_store::RecordSink;

use crate::worker::WorkerId;

/// Running totals across all workers.
#[derive(Debug, Default)]
pub struct HandlerStats {
    handled: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
    persist_timeouts: AtomicU64,
}

/// Point-in-time copy of [`HandlerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerSnapshot {
    pub handled: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    /// Persists abandoned at the timeout; the record may or may not be stored.
    pub persist_timeouts: u64,
}

impl HandlerStats {
    pub fn snapshot(&self) -> HandlerSnapshot {
        HandlerSnapshot {
            handled: self.handled.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            persist_timeouts: self.persist_timeouts.load(Ordering::Relaxed),
        }
    }
}

pub struct RecordHandler {
    sink: Arc<dyn RecordSink>,
    alerts: AlertHandle,
    /// Records at or above this severity are persisted.
    persist_severity: Severity,
    persist_timeout: Duration,
    stats: HandlerStats,
}

impl RecordHandler {
    pub fn new(
        sink: Arc<dyn RecordSink>,
        alerts: AlertHandle,
        persist_severity: Severity,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            alerts,
            persist_severity,
            persist_timeout,
            stats: HandlerStats::default(),
        }
    }

    pub fn from_config(
        config: &PoolConfig,
        sink: Arc<dyn RecordSink>,
        alerts: AlertHandle,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            sink,
            alerts,
            config.persist_severity,
            config.persist_timeout()?,
        ))
    }

    pub fn stats(&self) -> HandlerSnapshot {
        self.stats.snapshot()
    }

    /// Whether a record of this severity is persisted.
    pub fn should_persist(&self, severity: Severity) -> bool {
        severity >= self.persist_severity
    }

    /// Handle one record to completion.
    pub async fn handle(&self, worker_id: WorkerId, record: Record) {
        if self.should_persist(record.severity) {
            self.persist(worker_id, &record).await;
        }

        self.alerts.observe(record.severity);
        self.stats.handled.fetch_add(1, Ordering::Relaxed);

        match serde_json::to_string(&record) {
            Ok(json) => debug!(
                worker_id,
                severity = %record.severity,
                origin = %record.origin,
                record = %json,
                "record handled"
            ),
            Err(e) => warn!(worker_id, error = %e, "failed to encode record trace"),
        }
    }

    async fn persist(&self, worker_id: WorkerId, record: &Record) {
        match tokio::time::timeout(self.persist_timeout, self.sink.persist(record)).await {
            Ok(Ok(())) => {
                self.stats.persisted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker_id,
                    severity = %record.severity,
                    origin = %record.origin,
                    error = %e,
                    "persist failed, record dropped"
                );
            }
            Err(_) => {
                self.stats.persist_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker_id,
                    severity = %record.severity,
                    origin = %record.origin,
                    timeout_ms = self.persist_timeout.as_millis() as u64,
                    "persist timed out, outcome unknown"
                );
            }
        }
    }
}
