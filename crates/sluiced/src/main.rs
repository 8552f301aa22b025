//! sluiced — the Sluice daemon.
//!
//! Single binary that runs the record pipeline:
//! - Record store (redb)
//! - Bounded record queue + worker pool
//! - Autoscaler
//! - Alert aggregator
//! - Synthetic record generator
//! - Recent-records reporter
//!
//! # Usage
//!
//! ```text
//! sluiced run --config sluice.toml --data-dir /var/lib/sluice
//! sluiced config > sluice.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sluice_core::SluiceConfig;
use sluice_core::config::OverflowPolicy;
use sluice_store::RecordStore;
use sluiced::Pipeline;
use sluiced::report::{log_alerts, run_reporter};

const DEFAULT_FILTER: &str = "info,sluiced=debug,sluice=debug";

#[derive(Parser)]
#[command(name = "sluiced", about = "Sluice record pipeline daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline until Ctrl-C.
    Run {
        /// Path to sluice.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for the record store.
        #[arg(long, default_value = "/var/lib/sluice")]
        data_dir: PathBuf,

        /// Keep persisted records in memory only.
        #[arg(long)]
        in_memory: bool,

        /// Override `pool.min_workers`.
        #[arg(long)]
        min_workers: Option<usize>,

        /// Override `pool.max_workers`.
        #[arg(long)]
        max_workers: Option<usize>,

        /// Override `queue.capacity`.
        #[arg(long)]
        capacity: Option<usize>,

        /// Drop records when the queue is full instead of waiting.
        #[arg(long)]
        drop_when_full: bool,

        /// Disable the synthetic record generator.
        #[arg(long)]
        no_generator: bool,
    },

    /// Print the effective default configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            data_dir,
            in_memory,
            min_workers,
            max_workers,
            capacity,
            drop_when_full,
            no_generator,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(min) = min_workers {
                config.pool.min_workers = min;
            }
            if let Some(max) = max_workers {
                config.pool.max_workers = max;
            }
            if let Some(capacity) = capacity {
                config.queue.capacity = capacity;
            }
            if drop_when_full {
                config.queue.overflow = OverflowPolicy::Drop;
            }
            if no_generator {
                config.generator.enabled = false;
            }
            config.validate().context("invalid configuration")?;

            run(config, data_dir, in_memory).await
        }
        Command::Config => {
            print!("{}", SluiceConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SluiceConfig> {
    match path {
        Some(path) => SluiceConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(SluiceConfig::default()),
    }
}

fn open_store(config: &SluiceConfig, data_dir: &Path, in_memory: bool) -> anyhow::Result<RecordStore> {
    if in_memory {
        info!("record store in memory");
        return Ok(RecordStore::open_in_memory()?);
    }

    let db_path = match &config.store.path {
        Some(path) => path.clone(),
        None => {
            std::fs::create_dir_all(data_dir)?;
            data_dir.join("sluice.redb")
        }
    };
    let store = RecordStore::open(&db_path)
        .with_context(|| format!("failed to open record store at {}", db_path.display()))?;
    info!(path = ?db_path, "record store opened");
    Ok(store)
}

async fn run(config: SluiceConfig, data_dir: PathBuf, in_memory: bool) -> anyhow::Result<()> {
    info!("Sluice daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(&config, &data_dir, in_memory)?;
    let pipeline = Pipeline::start(&config, Arc::new(store.clone())).await?;

    // ── Start background tasks ─────────────────────────────────

    let report_interval = config.report.interval()?;
    let reporter = if report_interval.is_zero() {
        None
    } else {
        Some(tokio::spawn(run_reporter(
            store,
            report_interval,
            config.report.limit,
            pipeline.shutdown_signal(),
        )))
    };

    let alert_log = tokio::spawn(log_alerts(pipeline.subscribe_alerts()));

    // ── Graceful shutdown on Ctrl-C ────────────────────────────

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");

    let report = pipeline.shutdown().await;

    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }
    alert_log.abort();

    info!(
        generated = report.generated,
        handled = report.handled,
        persisted = report.persisted,
        dropped = report.dropped,
        "Sluice daemon stopped"
    );
    Ok(())
}
