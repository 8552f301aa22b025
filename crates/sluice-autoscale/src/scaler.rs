//! Autoscaler — hysteresis scaling of the worker pool.
//!
//! The decision itself lives in [`ScalePolicy::evaluate`], a pure function
//! of queue depth and pool size. [`Autoscaler`] samples both on a fixed
//! period and applies the decision to the pool manager.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use sluice_core::ConfigError;
use sluice_core::config::{AutoscaleConfig, PoolConfig};
use sluice_pool::{PoolManager, RecordQueue};

/// A scaling decision for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Resize the pool to the specified worker count.
    ScaleTo(usize),
    /// No change needed.
    NoChange,
}

/// Watermarks, steps and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalePolicy {
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub grow_step: usize,
    pub shrink_step: usize,
    pub min_workers: usize,
    pub max_workers: usize,
}

impl ScalePolicy {
    pub fn from_config(pool: &PoolConfig, autoscale: &AutoscaleConfig) -> Self {
        Self {
            high_watermark: autoscale.high_watermark,
            low_watermark: autoscale.low_watermark,
            grow_step: autoscale.grow_step,
            shrink_step: autoscale.shrink_step,
            min_workers: pool.min_workers,
            max_workers: pool.max_workers,
        }
    }

    /// Decide the next pool size from the queue depth and the current size.
    pub fn evaluate(&self, depth: usize, size: usize) -> ScaleDecision {
        // Out of bounds, e.g. before the pool was started.
        if size < self.min_workers {
            return ScaleDecision::ScaleTo(self.min_workers);
        }
        if size > self.max_workers {
            return ScaleDecision::ScaleTo(self.max_workers);
        }

        if depth > self.high_watermark && size < self.max_workers {
            let target = size.saturating_add(self.grow_step).min(self.max_workers);
            return ScaleDecision::ScaleTo(target);
        }

        if depth < self.low_watermark && size > self.min_workers {
            let target = size.saturating_sub(self.shrink_step).max(self.min_workers);
            return ScaleDecision::ScaleTo(target);
        }

        ScaleDecision::NoChange
    }
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default(), &AutoscaleConfig::default())
    }
}

/// Periodically resizes the pool according to a [`ScalePolicy`].
pub struct Autoscaler {
    queue: Arc<RecordQueue>,
    pool: Arc<PoolManager>,
    policy: ScalePolicy,
    interval: Duration,
}

impl Autoscaler {
    pub fn new(
        queue: Arc<RecordQueue>,
        pool: Arc<PoolManager>,
        policy: ScalePolicy,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            pool,
            policy,
            interval,
        }
    }

    pub fn from_config(
        queue: Arc<RecordQueue>,
        pool: Arc<PoolManager>,
        pool_config: &PoolConfig,
        config: &AutoscaleConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            queue,
            pool,
            ScalePolicy::from_config(pool_config, config),
            config.interval()?,
        ))
    }

    pub fn policy(&self) -> &ScalePolicy {
        &self.policy
    }

    /// Sample once and apply the decision.
    pub async fn tick(&self) -> ScaleDecision {
        let depth = self.queue.depth();
        let size = self.pool.size().await;
        let decision = self.policy.evaluate(depth, size);

        debug!(
            depth,
            workers = size,
            live = self.pool.live_workers(),
            dropped = self.queue.dropped(),
            "autoscaler status"
        );

        if let ScaleDecision::ScaleTo(target) = decision {
            let applied = self.pool.set_target(target).await;
            info!(depth, from = size, to = applied, "scaling pool");
        }
        decision
    }

    /// Run the autoscaler loop.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            high_watermark = self.policy.high_watermark,
            low_watermark = self.policy.low_watermark,
            "autoscaler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
