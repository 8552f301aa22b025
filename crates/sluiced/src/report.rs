//! Operator-facing output: the periodic "recent errors" report over the
//! durable store, and the alert log.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{info, warn};

use sluice_alert::Alert;
use sluice_store::{RecordStore, StoreError, StoredRecord};

/// Read the `limit` newest persisted records off the async runtime.
pub async fn recent_records(store: &RecordStore, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.recent(limit))
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
}

/// Log the newest persisted records every `interval` until shutdown.
pub async fn run_reporter(
    store: RecordStore,
    interval: Duration,
    limit: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, limit, "reporter started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match recent_records(&store, limit).await {
                    Ok(records) => {
                        info!(count = records.len(), "recent persisted records");
                        for stored in &records {
                            info!(
                                id = stored.id,
                                severity = %stored.record.severity,
                                origin = %stored.record.origin,
                                timestamp_ms = stored.record.timestamp_ms,
                                message = %stored.record.message,
                                "persisted record"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to read recent records"),
                }
            }
            _ = shutdown.changed() => {
                info!("reporter shutting down");
                break;
            }
        }
    }
}

/// Log every alert until the aggregator goes away. Returns how many were logged.
///
/// Falling behind the broadcast skips the overwritten alerts and keeps going.
pub async fn log_alerts(mut alerts: broadcast::Receiver<Alert>) -> u64 {
    let mut logged = 0;
    loop {
        match alerts.recv().await {
            Ok(alert) => {
                warn!(
                    count = alert.count,
                    threshold = alert.threshold,
                    window_start_ms = alert.window_start_ms,
                    window_end_ms = alert.window_end_ms,
                    "ALERT: error records above threshold"
                );
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "alert log fell behind, alerts skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}
