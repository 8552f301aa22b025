//! sluice-autoscale — queue-depth driven worker scaling.
//!
//! Samples the record queue depth and the pool size on a fixed period and
//! resizes the pool through `PoolManager::set_target`. The gap between the
//! two watermarks is a dead zone where nothing changes, which keeps the
//! pool from oscillating around a single threshold.
//!
//! # Scaling Algorithm
//!
//! ```text
//! depth = queue.depth()
//! size  = pool.size()
//!
//! if size outside [min_workers, max_workers]:
//!     ScaleTo(clamp(size))
//!
//! if depth > high_watermark and size < max_workers:
//!     ScaleTo(min(size + grow_step, max_workers))
//!
//! if depth < low_watermark and size > min_workers:
//!     ScaleTo(max(size - shrink_step, min_workers))
//!
//! otherwise NoChange
//! ```

pub mod scaler;

pub use scaler::{Autoscaler, ScaleDecision, ScalePolicy};
