//! End-to-end pipeline tests: records in, persisted records and alerts out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sluice_core::{Record, Severity, SluiceConfig};
use sluice_store::{MemorySink, RecordSink, RecordStore, StoreResult};
use sluiced::Pipeline;
use sluiced::report::recent_records;

fn config() -> SluiceConfig {
    let mut config = SluiceConfig::default();
    config.generator.enabled = false;
    config
}

fn mixed_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let severity = Severity::ALL[i % Severity::ALL.len()];
            Record::new(severity, format!("record {i}"), "api-gateway")
        })
        .collect()
}

/// Takes a while per persisted record so a backlog builds up.
struct SlowSink(MemorySink);

#[async_trait]
impl RecordSink for SlowSink {
    async fn persist(&self, record: &Record) -> StoreResult<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.0.persist(record).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn persists_exactly_the_error_records() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::start(&config(), sink.clone()).await.unwrap();

    let records = mixed_records(500);
    let expected = records.iter().filter(|r| r.severity.is_error()).count();
    for record in records {
        pipeline.queue().enqueue(record).await.unwrap();
    }

    let report = pipeline.shutdown().await;

    assert_eq!(report.handled, 500);
    assert_eq!(report.persisted as usize, expected);
    assert_eq!(report.persist_failures, 0);
    assert_eq!(report.persist_timeouts, 0);
    assert_eq!(report.undelivered, 0);
    assert_eq!(sink.len(), expected);
    assert!(sink.records().iter().all(|r| r.severity.is_error()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn persists_to_redb_and_reads_back_recent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sluice.redb");

    {
        let store = RecordStore::open(&path).unwrap();
        let pipeline = Pipeline::start(&config(), Arc::new(store)).await.unwrap();
        for record in mixed_records(50) {
            pipeline.queue().enqueue(record).await.unwrap();
        }
        let report = pipeline.shutdown().await;
        assert_eq!(report.persisted, 20);
    }

    let store = RecordStore::open(&path).unwrap();
    assert_eq!(store.count().unwrap(), 20);

    let recent = recent_records(&store, 5).await.unwrap();
    assert_eq!(recent.len(), 5);
    assert!(recent.windows(2).all(|pair| pair[0].id > pair[1].id));
    assert!(recent.iter().all(|stored| stored.record.severity.is_error()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn errors_above_threshold_raise_one_alert() {
    let mut config = config();
    // Long window: the alert comes from closing the partial window at shutdown.
    config.alert.period = "60s".to_string();
    config.alert.threshold = 5;

    let pipeline = Pipeline::start(&config, Arc::new(MemorySink::new())).await.unwrap();
    let mut alerts = pipeline.subscribe_alerts();

    for i in 0..7 {
        let record = Record::new(Severity::Error, format!("failure {i}"), "db-service");
        pipeline.queue().enqueue(record).await.unwrap();
    }
    for _ in 0..10 {
        let record = Record::new(Severity::Info, "ok", "db-service");
        pipeline.queue().enqueue(record).await.unwrap();
    }
    pipeline.shutdown().await;

    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.count, 7);
    assert_eq!(alert.threshold, 5);
    assert!(alerts.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn errors_at_threshold_raise_nothing() {
    let mut config = config();
    config.alert.period = "60s".to_string();

    let pipeline = Pipeline::start(&config, Arc::new(MemorySink::new())).await.unwrap();
    let mut alerts = pipeline.subscribe_alerts();

    for _ in 0..5 {
        let record = Record::new(Severity::Critical, "disk", "db-service");
        pipeline.queue().enqueue(record).await.unwrap();
    }
    pipeline.shutdown().await;

    assert!(alerts.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn autoscaler_grows_pool_under_backlog() {
    let mut config = config();
    config.autoscale.interval = "50ms".to_string();

    let sink = Arc::new(SlowSink(MemorySink::new()));
    let pipeline = Pipeline::start(&config, sink.clone()).await.unwrap();
    assert_eq!(pipeline.pool().size().await, 2);

    // Stop the workers so the backlog stays put while the autoscaler looks at it.
    pipeline.pool().set_target(0).await;
    for record in mixed_records(80) {
        pipeline.queue().enqueue(record).await.unwrap();
    }

    // First tick pulls the pool back to the floor; later ticks grow it while
    // the backlog is still above the high watermark.
    let grown = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pipeline.pool().size().await > 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(grown.is_ok());

    let report = pipeline.shutdown().await;
    assert_eq!(report.handled, 80);
    assert_eq!(sink.0.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn generator_feeds_the_pool() {
    let mut config = SluiceConfig::default();
    config.generator.batch = 20;
    config.generator.interval = "20ms".to_string();

    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::start(&config, sink.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let report = pipeline.shutdown().await;

    assert!(report.generated > 0);
    assert_eq!(report.handled, report.generated);
    assert_eq!(report.persisted as usize, sink.len());
}
