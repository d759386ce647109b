//! Synthetic scan ingestion.
//!
//! This module provides the status model used to manufacture plausible
//! scans, the live and bulk writers that append them to the event log, and
//! counters for a running generator.

pub mod generator;
pub mod model;
pub mod stats;

// Re-export commonly used types
pub use generator::{bulk_load, ingest_tick, Simulator, SimulatorConfig, SimulatorError};
pub use model::{RandSampler, ScanModel, ScanSampler, ScriptedSampler};
pub use stats::{IngestSnapshot, IngestStats, SharedIngestStats};
