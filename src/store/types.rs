//! Record types held by the event log.
//!
//! A [`Record`] is one wafer scan outcome. Records are immutable once
//! appended; the only way to remove one is a full-log reset.

use chrono::{DateTime, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clock format of trend labels and of time-only stored values.
pub const CLOCK_FORMAT: &str = "%H:%M:%S";

/// Outcome of a single scan.
///
/// Rows written by this crate are always `Pass` or `Fail`. Anything else
/// found in the store is carried through as `Other` so readers never fail
/// on a foreign row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum YieldStatus {
    Pass,
    Fail,
    Other(String),
}

impl YieldStatus {
    /// The string stored in the `yield_status` column.
    pub fn as_str(&self) -> &str {
        match self {
            YieldStatus::Pass => "PASS",
            YieldStatus::Fail => "FAIL",
            YieldStatus::Other(s) => s,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, YieldStatus::Pass)
    }
}

impl From<String> for YieldStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PASS" => YieldStatus::Pass,
            "FAIL" => YieldStatus::Fail,
            _ => YieldStatus::Other(s),
        }
    }
}

impl From<&str> for YieldStatus {
    fn from(s: &str) -> Self {
        YieldStatus::from(s.to_string())
    }
}

impl From<YieldStatus> for String {
    fn from(status: YieldStatus) -> Self {
        match status {
            YieldStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for YieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture time as found in the `timestamp` column.
///
/// Rows written by this crate hold RFC3339 instants. Older producers wrote
/// either a bare clock time or SQLite's `CURRENT_TIMESTAMP` form; both are
/// understood. Text that matches none of these is kept verbatim so exports
/// reproduce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Timestamp {
    /// A full UTC instant
    At(DateTime<Utc>),
    /// Time of day without a date
    Clock(NaiveTime),
    /// Unrecognized text
    Text(String),
}

impl Timestamp {
    /// Interpret stored column text. Never fails.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
            return Timestamp::At(ts.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Timestamp::At(naive.and_utc());
            }
        }
        if let Ok(clock) = NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f") {
            return Timestamp::Clock(clock);
        }
        Timestamp::Text(raw.to_string())
    }

    /// The instant, when the stored value carries a date.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::At(ts) => Some(*ts),
            _ => None,
        }
    }

    /// `HH:MM:SS` for values with a usable time of day.
    pub fn clock_label(&self) -> Option<String> {
        match self {
            Timestamp::At(ts) => Some(ts.format(CLOCK_FORMAT).to_string()),
            Timestamp::Clock(clock) => Some(clock.format(CLOCK_FORMAT).to_string()),
            Timestamp::Text(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Timestamp::At(ts)
    }
}

impl From<String> for Timestamp {
    fn from(raw: String) -> Self {
        Timestamp::parse(&raw)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        match ts {
            Timestamp::Text(raw) => raw,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::At(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Timestamp::Clock(clock) => write!(f, "{}", clock.format(CLOCK_FORMAT)),
            Timestamp::Text(raw) => f.write_str(raw),
        }
    }
}

/// One stored scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identity assigned by the log at append time
    pub id: i64,
    /// Pass/fail outcome
    #[serde(rename = "yield_status")]
    pub status: YieldStatus,
    /// Chamber temperature in degrees Celsius
    pub temp_c: Option<f64>,
    /// Chamber pressure in PSI
    pub pressure_psi: Option<f64>,
    /// Capture time stamped by the writer; `None` if the column is empty
    pub timestamp: Option<Timestamp>,
}

/// The writer-supplied part of a record, before the log assigns identity
/// and capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub status: YieldStatus,
    pub temp_c: f64,
    pub pressure_psi: f64,
}

/// Iteration order for a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrder {
    /// Oldest first
    #[default]
    Ascending,
    /// Newest first
    Descending,
}
