//! Counters for a live ingestion run.
//!
//! Tracks what the generator wrote (and failed to write) since it started,
//! without touching the event log.

use crate::store::types::{Record, YieldStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ingestion counters shared between the generator thread and its owner.
#[derive(Debug)]
pub struct IngestStats {
    /// Records appended
    scans_appended: AtomicU64,
    /// Appended records with a PASS outcome
    passes: AtomicU64,
    /// Appended records with a FAIL outcome
    fails: AtomicU64,
    /// Ticks whose append was rejected by the store
    append_failures: AtomicU64,
    /// Run start time
    started_at: DateTime<Utc>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            scans_appended: AtomicU64::new(0),
            passes: AtomicU64::new(0),
            fails: AtomicU64::new(0),
            append_failures: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Record a successful append.
    pub fn record_scan(&self, record: &Record) {
        self.scans_appended.fetch_add(1, Ordering::Relaxed);
        match record.status {
            YieldStatus::Pass => {
                self.passes.fetch_add(1, Ordering::Relaxed);
            }
            YieldStatus::Fail => {
                self.fails.fetch_add(1, Ordering::Relaxed);
            }
            YieldStatus::Other(_) => {}
        }
    }

    /// Record a failed append.
    pub fn record_append_failure(&self) {
        self.append_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            scans_appended: self.scans_appended.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            fails: self.fails.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
            run_duration_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        let run_yield = if stats.scans_appended == 0 {
            "n/a".to_string()
        } else {
            format!(
                "{:.2}%",
                100.0 * stats.passes as f64 / stats.scans_appended as f64
            )
        };
        format!(
            "Ingestion Statistics:\n\
             - Wafers scanned: {}\n\
             - Passed: {}\n\
             - Failed: {}\n\
             - Run yield: {}\n\
             - Failed appends: {}\n\
             - Run duration: {} seconds",
            stats.scans_appended,
            stats.passes,
            stats.fails,
            run_yield,
            stats.append_failures,
            stats.run_duration_secs
        )
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.scans_appended.store(0, Ordering::Relaxed);
        self.passes.store(0, Ordering::Relaxed);
        self.fails.store(0, Ordering::Relaxed);
        self.append_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSnapshot {
    pub scans_appended: u64,
    pub passes: u64,
    pub fails: u64,
    pub append_failures: u64,
    pub started_at: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Thread-safe shared ingestion stats.
pub type SharedIngestStats = Arc<IngestStats>;
