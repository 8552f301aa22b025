//! sluice-alert — error-rate alerting for the Sluice worker pool.
//!
//! Workers report the severity of every record they handle through a
//! cloneable [`AlertHandle`]. A single [`AlertAggregator`] task owns the
//! counting window, so increments from any number of workers are never lost.
//!
//! # Architecture
//!
//! ```text
//! workers ── AlertHandle::observe() ──► mpsc ──► AlertAggregator (sole writer)
//!                                                  ├── AlertWindow (count, start)
//!                                                  └── every period:
//!                                                        count > threshold → Alert (broadcast)
//!                                                        reset window
//! ```

pub mod aggregator;
pub mod window;

pub use aggregator::{AlertAggregator, AlertHandle};
pub use window::{Alert, AlertWindow};
