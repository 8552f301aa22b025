//! sluiced — the Sluice daemon library.
//!
//! Assembles the record pipeline out of the library crates:
//! - Record queue and worker pool (`sluice-pool`)
//! - Durable store (`sluice-store`, redb)
//! - Autoscaler (`sluice-autoscale`)
//! - Alert aggregator (`sluice-alert`)
//! - Synthetic generator and recent-records reporter (this crate)

pub mod generator;
pub mod pipeline;
pub mod report;

pub use generator::RecordGenerator;
pub use pipeline::{DRAIN_TIMEOUT, Pipeline, PipelineReport};
