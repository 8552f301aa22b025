//! Pipeline — the context object owning every running part.
//!
//! ```text
//!  RecordGenerator ──► RecordQueue ──► PoolManager (workers) ──► RecordSink
//!                          ▲                 ▲        │
//!                          │ depth           │ size   └──observe──► AlertAggregator ──► Alert
//!                          └──── Autoscaler ─┘
//! ```
//!
//! Shutdown order: producers and the autoscaler stop, the queue closes and
//! drains (bounded), the pool stops, and finally the alert aggregator closes
//! its partial window with every observation accounted for.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sluice_alert::{Alert, AlertAggregator};
use sluice_autoscale::Autoscaler;
use sluice_core::{ConfigError, SluiceConfig};
use sluice_pool::{HandlerSnapshot, PoolManager, RecordHandler, RecordQueue};
use sluice_store::RecordSink;

use crate::generator::RecordGenerator;

/// How long shutdown waits for queued records to be handled.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Totals reported by [`Pipeline::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Records accepted from the built-in generator.
    pub generated: u64,
    pub handled: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    /// Persists whose outcome is unknown because they hit the timeout.
    pub persist_timeouts: u64,
    /// Records rejected by a full queue.
    pub dropped: u64,
    /// Records still queued when the workers stopped.
    pub undelivered: usize,
}

pub struct Pipeline {
    queue: Arc<RecordQueue>,
    pool: Arc<PoolManager>,
    handler: Arc<RecordHandler>,
    alerts: broadcast::Receiver<Alert>,
    /// Stops producers and control loops.
    loops_tx: watch::Sender<bool>,
    /// Stops the alert aggregator, last.
    alert_tx: watch::Sender<bool>,
    generator: Option<JoinHandle<u64>>,
    autoscaler: JoinHandle<()>,
    aggregator: JoinHandle<()>,
}

impl Pipeline {
    /// Build every part from `config` and start the background tasks.
    ///
    /// The pool starts at `min_workers`.
    pub async fn start(config: &SluiceConfig, sink: Arc<dyn RecordSink>) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = Arc::new(RecordQueue::from_config(&config.queue));
        let aggregator = AlertAggregator::from_config(&config.alert)?;
        let alerts = aggregator.subscribe();
        let handler = Arc::new(RecordHandler::from_config(
            &config.pool,
            sink,
            aggregator.handle(),
        )?);
        let pool = Arc::new(PoolManager::new(
            Arc::clone(&queue),
            Arc::clone(&handler),
            config.pool.max_workers,
        ));
        let autoscaler = Autoscaler::from_config(
            Arc::clone(&queue),
            Arc::clone(&pool),
            &config.pool,
            &config.autoscale,
        )?;
        let generator = if config.generator.enabled {
            Some(RecordGenerator::from_config(&config.generator)?)
        } else {
            None
        };

        let (loops_tx, loops_rx) = watch::channel(false);
        let (alert_tx, alert_rx) = watch::channel(false);

        pool.set_target(config.pool.min_workers).await;

        let aggregator = tokio::spawn(aggregator.run(alert_rx));
        let autoscaler = {
            let shutdown = loops_rx.clone();
            tokio::spawn(async move { autoscaler.run(shutdown).await })
        };
        let generator = generator.map(|generator| tokio::spawn(generator.run(Arc::clone(&queue), loops_rx)));

        info!(
            capacity = queue.capacity(),
            policy = ?queue.policy(),
            min_workers = config.pool.min_workers,
            max_workers = config.pool.max_workers,
            generator = config.generator.enabled,
            "pipeline started"
        );

        Ok(Self {
            queue,
            pool,
            handler,
            alerts,
            loops_tx,
            alert_tx,
            generator,
            autoscaler,
            aggregator,
        })
    }

    pub fn queue(&self) -> &Arc<RecordQueue> {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    pub fn stats(&self) -> HandlerSnapshot {
        self.handler.stats()
    }

    /// Alerts emitted from now on.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts.resubscribe()
    }

    /// A receiver that flips when shutdown begins, for tasks started
    /// alongside the pipeline.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.loops_tx.subscribe()
    }

    /// Stop everything, handling queued records for up to [`DRAIN_TIMEOUT`].
    pub async fn shutdown(self) -> PipelineReport {
        self.shutdown_with_timeout(DRAIN_TIMEOUT).await
    }

    pub async fn shutdown_with_timeout(self, drain_timeout: Duration) -> PipelineReport {
        info!("pipeline shutting down");
        let _ = self.loops_tx.send(true);

        let generated = match self.generator {
            Some(task) => task.await.unwrap_or_else(|e| {
                warn!(error = %e, "generator task failed");
                0
            }),
            None => 0,
        };
        if let Err(e) = self.autoscaler.await {
            warn!(error = %e, "autoscaler task failed");
        }

        self.queue.close();
        let drained = tokio::time::timeout(drain_timeout, async {
            while self.queue.depth() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                depth = self.queue.depth(),
                timeout_ms = drain_timeout.as_millis() as u64,
                "queue not drained before timeout"
            );
        }

        self.pool.shutdown().await;

        let _ = self.alert_tx.send(true);
        if let Err(e) = self.aggregator.await {
            warn!(error = %e, "alert aggregator task failed");
        }

        let stats = self.handler.stats();
        let report = PipelineReport {
            generated,
            handled: stats.handled,
            persisted: stats.persisted,
            persist_failures: stats.persist_failures,
            persist_timeouts: stats.persist_timeouts,
            dropped: self.queue.dropped(),
            undelivered: self.queue.depth(),
        };
        info!(?report, "pipeline stopped");
        report
    }
}
