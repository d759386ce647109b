//! Aggregation engine for the yield monitor.
//!
//! This module contains:
//! - Window partitioning of record sequences
//! - Per-window yield and temperature features, the trend and the pass/fail tally

pub mod features;
pub mod windowing;

// Re-export commonly used types
pub use features::{
    compute_point, counts, round1, trend, window_yield_pct, TrendParams, TrendPoint, YieldCounts,
    DEFAULT_TEMP_FALLBACK_C, DEFAULT_WINDOW_SIZE,
};
pub use windowing::{partition, restrict_recent, RecordWindow, TrendError};
