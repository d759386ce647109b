//! Partitioning of a record sequence into fixed-size windows.
//!
//! Records are grouped into consecutive, non-overlapping windows of
//! `window_size` records in the order they were given. When the record
//! count is not a multiple of the window size, the final window is shorter
//! (a leftover window) and is kept as-is.

use crate::store::types::{Record, Timestamp};

/// Errors raised for invalid aggregation parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrendError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
}

/// A contiguous group of records used to compute one trend point.
#[derive(Debug, Clone, Copy)]
pub struct RecordWindow<'a> {
    /// Offset of the first member within the windowed sequence
    pub start: usize,
    /// Members, in source order
    pub records: &'a [Record],
}

impl<'a> RecordWindow<'a> {
    /// Number of records in this window.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the window has any records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether this window is shorter than the requested size.
    pub fn is_leftover(&self, window_size: usize) -> bool {
        self.len() < window_size
    }

    /// Number of members with a PASS outcome.
    pub fn pass_count(&self) -> usize {
        self.records.iter().filter(|r| r.status.is_pass()).count()
    }

    /// Capture time of the most recent member.
    pub fn last_timestamp(&self) -> Option<&Timestamp> {
        self.records.last().and_then(|r| r.timestamp.as_ref())
    }
}

/// Keep only the last `recent_limit` records, or all of them when `None`.
///
/// This is applied before windowing, so the windows are aligned to the
/// start of the restricted suffix.
pub fn restrict_recent(
    records: &[Record],
    recent_limit: Option<usize>,
) -> Result<&[Record], TrendError> {
    match recent_limit {
        Some(0) => Err(TrendError::InvalidParameter {
            name: "recent_limit",
            reason: "must be positive",
        }),
        Some(limit) => Ok(&records[records.len().saturating_sub(limit)..]),
        None => Ok(records),
    }
}

/// Split `records` into windows of `window_size`.
pub fn partition(records: &[Record], window_size: usize) -> Result<Vec<RecordWindow<'_>>, TrendError> {
    if window_size == 0 {
        return Err(TrendError::InvalidParameter {
            name: "window_size",
            reason: "must be positive",
        });
    }

    Ok(records
        .chunks(window_size)
        .enumerate()
        .map(|(i, chunk)| RecordWindow {
            start: i * window_size,
            records: chunk,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::YieldStatus;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record {
                id: i as i64,
                status: YieldStatus::Pass,
                temp_c: Some(200.0),
                pressure_psi: Some(30.0),
                timestamp: None,
            })
            .collect()
    }

    #[test]
    fn test_partition_keeps_leftover() {
        let recs = records(23);
        let windows = partition(&recs, 10).unwrap();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start, 0);
        assert_eq!(windows[2].start, 20);
        assert_eq!(windows[2].len(), 3);
        assert!(windows[2].is_leftover(10));
        assert!(!windows[1].is_leftover(10));
    }

    #[test]
    fn test_partition_empty() {
        let windows = partition(&[], 10).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_partition_rejects_zero_window() {
        let err = partition(&records(3), 0).unwrap_err();
        assert_eq!(
            err,
            TrendError::InvalidParameter {
                name: "window_size",
                reason: "must be positive"
            }
        );
    }

    #[test]
    fn test_restrict_recent_takes_suffix() {
        let recs = records(60);
        let recent = restrict_recent(&recs, Some(50)).unwrap();
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].id, 10);

        let short = restrict_recent(&recs[..5], Some(50)).unwrap();
        assert_eq!(short.len(), 5);

        assert_eq!(restrict_recent(&recs, None).unwrap().len(), 60);
        assert!(restrict_recent(&recs, Some(0)).is_err());
    }
}
