//! Yield Monitor - manufacturing yield event log with windowed trends.
//!
//! This library ingests a stream of wafer scan readings (temperature,
//! pressure, pass/fail outcome) into an append-only event log and answers
//! analytical queries against the accumulated history.
//!
//! # Guarantees
//!
//! - **Append-only**: records are never edited; only a full reset removes them
//! - **Monotonic ids**: ids increase by one per append and restart at 0 after a reset
//! - **Consistent reads**: a snapshot never observes a partial append or reset
//! - **Pure aggregation**: trends and counts are recomputed from a snapshot on every query
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Yield Monitor                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Simulator  │──▶│  Event Log  │──▶│  Windowing  │       │
//! │  │  (1 s tick) │   │  (SQLite)   │   │ (10 records)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                 │                  │              │
//! │         ▼                 ▼                  ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Ingest    │   │ CSV Export  │   │   Trend /   │       │
//! │  │   Stats     │   │             │   │   Counts    │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use yield_monitor::{EventLog, RandSampler, ScanModel, TrendParams, YieldService};
//!
//! let log = Arc::new(EventLog::open("factory_data.db").expect("Failed to open log"));
//! let service = YieldService::new(
//!     log,
//!     ScanModel::default(),
//!     TrendParams::default(),
//!     Box::new(RandSampler::from_entropy()),
//! );
//!
//! service.initialize(500).expect("Failed to load records");
//! let stats = service.get_stats(None, None).expect("Failed to query stats");
//! println!("{} passed, {} trend points", stats.counts.pass, stats.trend.len());
//! ```

pub mod config;
pub mod core;
pub mod export;
pub mod service;
pub mod simulator;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use crate::core::{counts, trend, TrendError, TrendParams, TrendPoint, YieldCounts};
pub use config::{Config, ConfigError};
pub use service::{AuditReport, ServiceError, YieldService, YieldStats};
pub use simulator::{
    bulk_load, ingest_tick, IngestStats, RandSampler, ScanModel, ScanSampler, ScriptedSampler,
    Simulator, SimulatorConfig,
};
pub use store::{EventLog, Record, SnapshotOrder, StoreError, Timestamp, YieldStatus};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
