//! Fixed-period error counting window.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use sluice_core::epoch_millis;

/// Structured notification emitted when a window's error count exceeds the
/// threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Error-classified records observed in the window.
    pub count: u64,
    /// The threshold that was exceeded.
    pub threshold: u64,
    /// How long the window was open.
    pub window: Duration,
    /// Unix timestamp (milliseconds) when the window opened.
    pub window_start_ms: u64,
    /// Unix timestamp (milliseconds) when the window closed.
    pub window_end_ms: u64,
}

/// Counter of error-classified records since the window started.
///
/// `close()` evaluates the window and unconditionally starts a new one.
#[derive(Debug)]
pub struct AlertWindow {
    count: u64,
    threshold: u64,
    period: Duration,
    started: Instant,
    started_ms: u64,
}

impl AlertWindow {
    pub fn new(threshold: u64, period: Duration) -> Self {
        Self {
            count: 0,
            threshold,
            period,
            started: Instant::now(),
            started_ms: epoch_millis(),
        }
    }

    /// Count one error-classified record.
    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Close the current window.
    ///
    /// Returns an alert if the count is strictly greater than the threshold.
    /// The count is reset to zero and a new window starts either way.
    pub fn close(&mut self) -> Option<Alert> {
        let now_ms = epoch_millis();
        let alert = (self.count > self.threshold).then(|| Alert {
            count: self.count,
            threshold: self.threshold,
            window: self.started.elapsed(),
            window_start_ms: self.started_ms,
            window_end_ms: now_ms,
        });

        self.count = 0;
        self.started = Instant::now();
        self.started_ms = now_ms;
        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_errors_over_threshold_five_alerts_once() {
        let mut window = AlertWindow::new(5, Duration::from_secs(20));
        for _ in 0..7 {
            window.record();
        }

        let alert = window.close().expect("count 7 exceeds threshold 5");
        assert_eq!(alert.count, 7);
        assert_eq!(alert.threshold, 5);
        assert_eq!(window.count(), 0);

        // A single error in the next window stays below the threshold.
        window.record();
        assert!(window.close().is_none());
    }

    #[test]
    fn count_equal_to_threshold_does_not_alert() {
        let mut window = AlertWindow::new(5, Duration::from_secs(20));
        for _ in 0..5 {
            window.record();
        }
        assert!(window.close().is_none());
    }

    #[test]
    fn close_resets_even_without_alert() {
        let mut window = AlertWindow::new(5, Duration::from_secs(20));
        for _ in 0..3 {
            window.record();
        }
        assert!(window.close().is_none());
        assert_eq!(window.count(), 0);

        // Counts do not carry across windows.
        for _ in 0..3 {
            window.record();
        }
        assert!(window.close().is_none());
    }

    #[test]
    fn zero_threshold_alerts_on_first_error() {
        let mut window = AlertWindow::new(0, Duration::from_secs(1));
        assert!(window.close().is_none());
        window.record();
        assert_eq!(window.close().map(|a| a.count), Some(1));
    }

    #[test]
    fn alert_serializes_as_structured_event() {
        let alert = Alert {
            count: 7,
            threshold: 5,
            window: Duration::from_secs(20),
            window_start_ms: 1_000,
            window_end_ms: 21_000,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["count"], 7);
        assert_eq!(json["window"]["secs"], 20);
    }
}
