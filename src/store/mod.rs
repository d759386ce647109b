//! Record storage for the yield monitor.
//!
//! This module provides the append-only event log and the record types
//! stored in it.

pub mod event_log;
pub mod types;

// Re-export commonly used types
pub use event_log::{EventLog, StoreError, TABLE_NAME};
pub use types::{Record, Scan, SnapshotOrder, Timestamp, YieldStatus};
