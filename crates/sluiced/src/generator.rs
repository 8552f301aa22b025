//! Synthetic record generator.
//!
//! Emits a batch of records per tick with severity, message and origin drawn
//! uniformly from fixed vocabularies. Used to exercise the pipeline without
//! an external producer.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, info};

use sluice_core::config::GeneratorConfig;
use sluice_core::{ConfigError, Record, Severity};
use sluice_pool::{QueueError, RecordQueue};

pub const MESSAGES: [&str; 5] = [
    "User login success",
    "File not found",
    "Database connection failed",
    "Cache miss",
    "Timeout error",
];

pub const ORIGINS: [&str; 4] = ["auth-service", "db-service", "cache-service", "api-gateway"];

pub struct RecordGenerator {
    batch: usize,
    interval: Duration,
    rng: StdRng,
}

impl RecordGenerator {
    pub fn new(batch: usize, interval: Duration) -> Self {
        Self {
            batch,
            interval,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.batch, config.interval()?))
    }

    /// Deterministic output, for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn next_record(&mut self) -> Record {
        let severity = Severity::ALL[self.rng.random_range(0..Severity::ALL.len())];
        let message = MESSAGES.choose(&mut self.rng).copied().unwrap_or(MESSAGES[0]);
        let origin = ORIGINS.choose(&mut self.rng).copied().unwrap_or(ORIGINS[0]);
        Record::new(severity, message, origin)
    }

    pub fn next_batch(&mut self) -> Vec<Record> {
        (0..self.batch).map(|_| self.next_record()).collect()
    }

    /// Enqueue one batch per interval until shutdown or the queue closes.
    ///
    /// Returns the number of records accepted by the queue.
    pub async fn run(mut self, queue: Arc<RecordQueue>, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            batch = self.batch,
            interval_ms = self.interval.as_millis() as u64,
            "record generator started"
        );
        let mut accepted = 0;

        'outer: loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }

            let mut rejected = 0;
            for record in self.next_batch() {
                // Enqueue may wait under the block policy.
                let result = tokio::select! {
                    result = queue.enqueue(record) => result,
                    _ = shutdown.changed() => break 'outer,
                };
                match result {
                    Ok(()) => accepted += 1,
                    Err(QueueError::Full) => rejected += 1,
                    Err(QueueError::Closed) => break 'outer,
                }
            }
            debug!(accepted, rejected, depth = queue.depth(), "generated batch");
        }

        info!(accepted, "record generator stopped");
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::config::OverflowPolicy;

    #[test]
    fn draws_from_fixed_vocabularies() {
        let mut generator = RecordGenerator::new(50, Duration::from_secs(1)).with_seed(7);
        let batch = generator.next_batch();

        assert_eq!(batch.len(), 50);
        for record in &batch {
            assert!(MESSAGES.contains(&record.message.as_str()));
            assert!(ORIGINS.contains(&record.origin.as_str()));
        }
    }

    #[test]
    fn seeded_generators_agree() {
        let mut a = RecordGenerator::new(20, Duration::from_secs(1)).with_seed(42);
        let mut b = RecordGenerator::new(20, Duration::from_secs(1)).with_seed(42);
        let severities = |batch: Vec<Record>| batch.into_iter().map(|r| r.severity).collect::<Vec<_>>();

        assert_eq!(severities(a.next_batch()), severities(b.next_batch()));
    }

    #[test]
    fn covers_every_severity_eventually() {
        let mut generator = RecordGenerator::new(500, Duration::from_secs(1)).with_seed(1);
        let batch = generator.next_batch();
        for severity in Severity::ALL {
            assert!(batch.iter().any(|r| r.severity == severity));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_enqueues_one_batch_per_tick() {
        let queue = Arc::new(RecordQueue::new(100, OverflowPolicy::Drop));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let generator = RecordGenerator::new(30, Duration::from_secs(1)).with_seed(3);
        let task = tokio::spawn(generator.run(queue.clone(), shutdown_rx));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(queue.depth(), 60);

        // Next tick overflows: 10 accepted, 20 dropped.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(queue.depth(), 100);
        assert_eq!(queue.dropped(), 20);

        shutdown_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), 70);
    }

    #[tokio::test]
    async fn stops_when_queue_closes() {
        let queue = Arc::new(RecordQueue::new(10, OverflowPolicy::Block));
        queue.close();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let generator = RecordGenerator::new(5, Duration::from_millis(1));
        assert_eq!(generator.run(queue, shutdown_rx).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_blocked_enqueue() {
        let queue = Arc::new(RecordQueue::new(5, OverflowPolicy::Block));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let generator = RecordGenerator::new(20, Duration::from_secs(1));
        let task = tokio::spawn(generator.run(queue.clone(), shutdown_rx));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(queue.depth(), 5);

        shutdown_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), 5);
    }
}
