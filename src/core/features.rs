//! Yield features computed from record windows.
//!
//! Everything here is a pure function of its input records: no state is
//! carried between calls or between windows.

use crate::core::windowing::{partition, restrict_recent, RecordWindow, TrendError};
use crate::store::types::{Record, Timestamp, YieldStatus};
use serde::{Deserialize, Serialize};

/// Default number of records per trend window.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Average temperature reported for a window with no usable readings.
pub const DEFAULT_TEMP_FALLBACK_C: f64 = 200.0;

/// Pass/fail tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldCounts {
    #[serde(rename = "PASS")]
    pub pass: u64,
    #[serde(rename = "FAIL")]
    pub fail: u64,
}

impl YieldCounts {
    pub fn total(&self) -> u64 {
        self.pass + self.fail
    }

    /// Share of PASS outcomes as a percentage, or `None` with nothing counted.
    pub fn yield_pct(&self) -> Option<f64> {
        if self.total() == 0 {
            None
        } else {
            Some(100.0 * self.pass as f64 / self.total() as f64)
        }
    }
}

/// One point of the yield trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Capture time of the window's last record, or an ordinal fallback
    #[serde(rename = "time")]
    pub time_label: String,
    /// Percentage of PASS records in the window, one decimal
    #[serde(rename = "yield")]
    pub yield_pct: f64,
    /// Mean temperature of the window, one decimal
    #[serde(rename = "temp", skip_serializing_if = "Option::is_none")]
    pub avg_temp: Option<f64>,
    /// Number of records in the window
    pub samples: usize,
}

/// Parameters for [`trend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendParams {
    /// Records per window
    pub window_size: usize,
    /// Restrict to the most recent N records before windowing
    pub recent_limit: Option<usize>,
    /// Whether to report the mean temperature per window
    pub include_avg_temp: bool,
    /// Mean temperature used when a window has no usable reading
    pub temp_fallback_c: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            recent_limit: None,
            include_avg_temp: true,
            temp_fallback_c: DEFAULT_TEMP_FALLBACK_C,
        }
    }
}

impl TrendParams {
    pub fn with_window_size(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }
}

/// Tally PASS and FAIL outcomes. Other statuses are skipped and logged.
pub fn counts(records: &[Record]) -> YieldCounts {
    let mut counts = YieldCounts::default();
    for record in records {
        match &record.status {
            YieldStatus::Pass => counts.pass += 1,
            YieldStatus::Fail => counts.fail += 1,
            YieldStatus::Other(status) => {
                tracing::warn!(
                    "Ignoring record {} with unrecognized status {:?}",
                    record.id,
                    status
                );
            }
        }
    }
    counts
}

/// Fold an oldest-first record sequence into trend points.
///
/// Points are emitted in the order of the input. Callers that want a
/// newest-first display reverse the result themselves.
pub fn trend(records: &[Record], params: &TrendParams) -> Result<Vec<TrendPoint>, TrendError> {
    let records = restrict_recent(records, params.recent_limit)?;
    let windows = partition(records, params.window_size)?;

    Ok(windows
        .iter()
        .filter_map(|window| compute_point(window, params))
        .collect())
}

/// Compute the trend point for one window. Empty windows produce nothing.
pub fn compute_point(window: &RecordWindow<'_>, params: &TrendParams) -> Option<TrendPoint> {
    if window.is_empty() {
        return None;
    }

    let time_label = window
        .last_timestamp()
        .and_then(Timestamp::clock_label)
        .unwrap_or_else(|| format!("Pt {}", window.start));

    let avg_temp = params
        .include_avg_temp
        .then(|| round1(mean_temp(window).unwrap_or(params.temp_fallback_c)));

    Some(TrendPoint {
        time_label,
        yield_pct: window_yield_pct(window),
        avg_temp,
        samples: window.len(),
    })
}

/// PASS percentage of a window, rounded to one decimal. Empty windows yield 0.
pub fn window_yield_pct(window: &RecordWindow<'_>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    round1(100.0 * window.pass_count() as f64 / window.len() as f64)
}

/// Mean of the finite temperature readings in a window.
fn mean_temp(window: &RecordWindow<'_>) -> Option<f64> {
    let temps: Vec<f64> = window
        .records
        .iter()
        .filter_map(|r| r.temp_c)
        .filter(|t| t.is_finite())
        .collect();

    if temps.is_empty() {
        None
    } else {
        Some(temps.iter().sum::<f64>() / temps.len() as f64)
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
