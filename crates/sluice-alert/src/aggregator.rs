//! Alert aggregator — the single owner of the error window.
//!
//! Workers never touch the counter directly. They send one observation per
//! handled record over an unbounded channel; the aggregator task counts the
//! error-classified ones and closes the window on a fixed period.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use sluice_core::config::AlertConfig;
use sluice_core::{ConfigError, Severity};

use crate::window::{Alert, AlertWindow};

/// Capacity of the alert broadcast channel.
const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable sender side handed to every worker.
#[derive(Debug, Clone)]
pub struct AlertHandle {
    tx: mpsc::UnboundedSender<Severity>,
}

impl AlertHandle {
    /// Report the severity of a handled record. Never blocks.
    pub fn observe(&self, severity: Severity) {
        if self.tx.send(severity).is_err() {
            debug!(%severity, "alert aggregator stopped, observation dropped");
        }
    }
}

/// Counts error-classified records per fixed window and emits [`Alert`]s.
pub struct AlertAggregator {
    window: AlertWindow,
    /// Records at or above this severity count toward the window.
    severity: Severity,
    rx: mpsc::UnboundedReceiver<Severity>,
    tx: mpsc::UnboundedSender<Severity>,
    alerts: broadcast::Sender<Alert>,
    /// Records seen in the current window, of any severity.
    observed: u64,
}

impl AlertAggregator {
    pub fn new(period: Duration, threshold: u64, severity: Severity) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            window: AlertWindow::new(threshold, period),
            severity,
            rx,
            tx,
            alerts,
            observed: 0,
        }
    }

    pub fn from_config(config: &AlertConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.period()?, config.threshold, config.severity))
    }

    /// A handle workers use to report handled records.
    pub fn handle(&self) -> AlertHandle {
        AlertHandle {
            tx: self.tx.clone(),
        }
    }

    /// Subscribe to emitted alerts.
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.alerts.subscribe()
    }

    /// Errors counted in the current window so far.
    pub fn current_count(&self) -> u64 {
        self.window.count()
    }

    fn observe(&mut self, severity: Severity) {
        self.observed += 1;
        if severity >= self.severity {
            self.window.record();
        }
    }

    /// Pull every observation already queued so none sent before the
    /// boundary leaks into the next window.
    fn drain_pending(&mut self) {
        while let Ok(severity) = self.rx.try_recv() {
            self.observe(severity);
        }
    }

    /// Close the current window, emitting an alert if warranted.
    pub fn close_window(&mut self) -> Option<Alert> {
        self.drain_pending();
        let observed = std::mem::take(&mut self.observed);
        let alert = self.window.close();

        match &alert {
            Some(alert) => {
                warn!(
                    count = alert.count,
                    threshold = alert.threshold,
                    window_ms = alert.window.as_millis() as u64,
                    "error threshold exceeded"
                );
                // No subscribers is fine.
                let _ = self.alerts.send(alert.clone());
            }
            None => {
                debug!(observed, "alert window closed below threshold");
            }
        }
        alert
    }

    /// Run the aggregation loop until the shutdown signal.
    ///
    /// The partial window open at shutdown is closed with the same rule.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.window.period();
        info!(
            period_ms = period.as_millis() as u64,
            threshold = self.window.threshold(),
            severity = %self.severity,
            "alert aggregator started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(severity) = self.rx.recv() => {
                    self.observe(severity);
                }
                _ = ticker.tick() => {
                    self.close_window();
                }
                _ = shutdown.changed() => {
                    info!("alert aggregator shutting down");
                    self.close_window();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn aggregator() -> AlertAggregator {
        AlertAggregator::new(Duration::from_secs(20), 5, Severity::Error)
    }

    #[tokio::test]
    async fn only_error_classified_records_count() {
        let mut agg = aggregator();
        let handle = agg.handle();

        for severity in Severity::ALL {
            handle.observe(severity);
        }
        agg.drain_pending();

        // Error and Critical.
        assert_eq!(agg.current_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_observations_are_not_lost() {
        let mut agg = aggregator();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = agg.handle();
            tasks.push(tokio::spawn(async move {
                for _ in 0..250 {
                    handle.observe(Severity::Critical);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut alerts = agg.subscribe();
        let alert = agg.close_window().unwrap();
        assert_eq!(alert.count, 2000);
        assert_eq!(alerts.try_recv().unwrap().count, 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn alert_fires_once_per_window_and_resets() {
        let agg = aggregator();
        let handle = agg.handle();
        let mut alerts = agg.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(agg.run(shutdown_rx));

        for _ in 0..7 {
            handle.observe(Severity::Error);
        }
        tokio::time::sleep(Duration::from_secs(21)).await;

        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.count, 7);
        assert_eq!(alert.window, Duration::from_secs(20));

        // An 8th error alone in the new window does not alert.
        handle.observe(Severity::Error);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(matches!(alerts.try_recv(), Err(TryRecvError::Empty)));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(matches!(alerts.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_partial_window() {
        let agg = aggregator();
        let handle = agg.handle();
        let mut alerts = agg.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(agg.run(shutdown_rx));

        for _ in 0..6 {
            handle.observe(Severity::Critical);
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let alert = alerts.try_recv().unwrap();
        assert_eq!(alert.count, 6);
        assert_eq!(alert.window, Duration::from_secs(5));
    }

    #[test]
    fn from_config_reads_period_and_threshold() {
        let config = AlertConfig {
            period: "10s".to_string(),
            threshold: 3,
            severity: Severity::Critical,
        };
        let agg = AlertAggregator::from_config(&config).unwrap();
        assert_eq!(agg.window.period(), Duration::from_secs(10));
        assert_eq!(agg.window.threshold(), 3);
        assert_eq!(agg.severity, Severity::Critical);
    }

    #[test]
    fn observe_after_aggregator_dropped_is_harmless() {
        let handle = aggregator().handle();
        handle.observe(Severity::Error);
    }
}
