//! Query and mutation surface over a shared event log.
//!
//! [`YieldService`] is what the HTTP and CLI layers call into. Every query
//! takes one snapshot of the log and hands it to the aggregation engine,
//! so aggregation never holds the storage lock.

use crate::core::{
    counts, partition, restrict_recent, trend, TrendError, TrendParams, TrendPoint, YieldCounts,
};
use crate::export;
use crate::simulator::{self, ScanModel, ScanSampler};
use crate::store::{EventLog, Record, SnapshotOrder, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Errors surfaced to callers of the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Trend(#[from] TrendError),
    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),
}

/// Counts and trend in one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldStats {
    pub counts: YieldCounts,
    pub trend: Vec<TrendPoint>,
}

/// Summary of the whole log for a quick health check of the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Records currently stored
    pub total_scanned: u64,
    /// Global PASS percentage, two decimals; `None` for an empty log
    pub global_yield_pct: Option<f64>,
    /// Most recent records, oldest first
    pub last_scans: Vec<Record>,
}

/// Shared entry point for queries, ingestion and reset.
pub struct YieldService {
    log: Arc<EventLog>,
    model: ScanModel,
    trend_defaults: TrendParams,
    sampler: Mutex<Box<dyn ScanSampler>>,
}

impl YieldService {
    pub fn new(
        log: Arc<EventLog>,
        model: ScanModel,
        trend_defaults: TrendParams,
        sampler: Box<dyn ScanSampler>,
    ) -> Self {
        Self {
            log,
            model,
            trend_defaults,
            sampler: Mutex::new(sampler),
        }
    }

    /// The underlying log.
    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn trend_defaults(&self) -> &TrendParams {
        &self.trend_defaults
    }

    /// PASS/FAIL tally over the full history.
    pub fn get_counts(&self) -> Result<YieldCounts, ServiceError> {
        let records = self.log.snapshot(SnapshotOrder::Ascending, None)?;
        Ok(counts(&records))
    }

    /// Windowed trend, oldest first.
    ///
    /// `None` arguments fall back to the configured defaults.
    pub fn get_trend(
        &self,
        window_size: Option<usize>,
        recent_limit: Option<usize>,
    ) -> Result<Vec<TrendPoint>, ServiceError> {
        let params = self.trend_params(window_size, recent_limit);
        // Reject bad parameters before touching the store.
        partition(&[], params.window_size)?;
        restrict_recent(&[], params.recent_limit)?;

        let records = self.log.snapshot(SnapshotOrder::Ascending, None)?;
        Ok(trend(&records, &params)?)
    }

    /// Counts and trend computed from the same snapshot.
    pub fn get_stats(
        &self,
        window_size: Option<usize>,
        recent_limit: Option<usize>,
    ) -> Result<YieldStats, ServiceError> {
        let params = self.trend_params(window_size, recent_limit);
        partition(&[], params.window_size)?;
        restrict_recent(&[], params.recent_limit)?;

        let records = self.log.snapshot(SnapshotOrder::Ascending, None)?;
        Ok(YieldStats {
            counts: counts(&records),
            trend: trend(&records, &params)?,
        })
    }

    /// Every record, ascending by id.
    pub fn get_full_history(&self) -> Result<Vec<Record>, ServiceError> {
        Ok(self.log.snapshot(SnapshotOrder::Ascending, None)?)
    }

    /// The `limit` most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Record>, ServiceError> {
        Ok(self.log.snapshot(SnapshotOrder::Descending, Some(limit))?)
    }

    /// Append one synthetic scan.
    pub fn ingest_tick(&self) -> Result<Record, ServiceError> {
        let mut sampler = self.sampler_guard()?;
        Ok(simulator::ingest_tick(&self.log, &self.model, sampler.as_mut())?)
    }

    /// Append `num_records` synthetic scans in one transaction.
    pub fn bulk_load(&self, num_records: usize) -> Result<Vec<Record>, ServiceError> {
        let mut sampler = self.sampler_guard()?;
        Ok(simulator::bulk_load(
            &self.log,
            &self.model,
            sampler.as_mut(),
            num_records,
        )?)
    }

    /// Clear the log and load `num_records` fresh scans.
    pub fn initialize(&self, num_records: usize) -> Result<Vec<Record>, ServiceError> {
        self.reset_all()?;
        self.bulk_load(num_records)
    }

    /// Remove every record.
    pub fn reset_all(&self) -> Result<(), ServiceError> {
        self.log.reset()?;
        Ok(())
    }

    /// Total, global yield and the last `last_n` scans.
    pub fn audit(&self, last_n: usize) -> Result<AuditReport, ServiceError> {
        let records = self.log.snapshot(SnapshotOrder::Ascending, None)?;
        let tally = counts(&records);
        let tail_start = records.len().saturating_sub(last_n);

        Ok(AuditReport {
            total_scanned: records.len() as u64,
            global_yield_pct: tally
                .yield_pct()
                .map(|pct| (pct * 100.0).round() / 100.0),
            last_scans: records[tail_start..].to_vec(),
        })
    }

    /// Full history as CSV.
    pub fn export_csv(&self) -> Result<String, ServiceError> {
        let records = self.get_full_history()?;
        Ok(export::to_csv(&records))
    }

    /// Write the full history as a timestamped CSV report in `dir`.
    pub fn export_to_dir(&self, dir: &Path) -> Result<PathBuf, ServiceError> {
        let records = self.get_full_history()?;
        Ok(export::write_report(dir, &records, Utc::now())?)
    }

    fn trend_params(&self, window_size: Option<usize>, recent_limit: Option<usize>) -> TrendParams {
        TrendParams {
            window_size: window_size.unwrap_or(self.trend_defaults.window_size),
            recent_limit: recent_limit.or(self.trend_defaults.recent_limit),
            ..self.trend_defaults.clone()
        }
    }

    fn sampler_guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Box<dyn ScanSampler>>, StoreError> {
        self.sampler.lock().map_err(|_| StoreError::StorageUnavailable {
            operation: "ingest",
            reason: "sampler lock poisoned".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{RandSampler, ScriptedSampler};
    use crate::store::YieldStatus;

    fn service_with(sampler: Box<dyn ScanSampler>) -> YieldService {
        let log = Arc::new(EventLog::open_in_memory().unwrap());
        YieldService::new(log, ScanModel::default(), TrendParams::default(), sampler)
    }

    /// Ten PASS scans followed by five FAIL scans.
    fn scripted_fifteen() -> Box<dyn ScanSampler> {
        let mut scans = vec![(200.0, 30.0, 0.9); 10];
        scans.extend(vec![(209.0, 30.0, 0.9); 5]);
        Box::new(ScriptedSampler::from_scans(&scans))
    }

    #[test]
    fn test_stats_from_scripted_ingest() {
        let service = service_with(scripted_fifteen());
        for _ in 0..15 {
            service.ingest_tick().unwrap();
        }

        let stats = service.get_stats(None, None).unwrap();
        assert_eq!(stats.counts, YieldCounts { pass: 10, fail: 5 });
        let yields: Vec<f64> = stats.trend.iter().map(|p| p.yield_pct).collect();
        assert_eq!(yields, vec![100.0, 0.0]);
    }

    #[test]
    fn test_recent_limit_override() {
        let service = service_with(scripted_fifteen());
        service.bulk_load(15).unwrap();

        let trend = service.get_trend(Some(5), Some(5)).unwrap();
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].yield_pct, 0.0);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let service = service_with(Box::new(RandSampler::seeded(1)));
        assert!(matches!(
            service.get_trend(Some(0), None),
            Err(ServiceError::Trend(TrendError::InvalidParameter { .. }))
        ));
        assert!(matches!(
            service.get_stats(None, Some(0)),
            Err(ServiceError::Trend(TrendError::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn test_initialize_replaces_history() {
        let service = service_with(Box::new(RandSampler::seeded(2)));
        service.bulk_load(20).unwrap();

        let records = service.initialize(500).unwrap();
        assert_eq!(records.first().unwrap().id, 0);
        assert_eq!(service.log().count().unwrap(), 500);
    }

    #[test]
    fn test_audit_report() {
        let service = service_with(scripted_fifteen());
        assert_eq!(service.audit(5).unwrap().global_yield_pct, None);

        service.bulk_load(15).unwrap();
        let report = service.audit(5).unwrap();

        assert_eq!(report.total_scanned, 15);
        assert_eq!(report.global_yield_pct, Some(66.67));
        assert_eq!(
            report.last_scans.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![10, 11, 12, 13, 14]
        );
        assert!(report
            .last_scans
            .iter()
            .all(|r| r.status == YieldStatus::Fail));
    }

    #[test]
    fn test_reset_then_counts_empty() {
        let service = service_with(Box::new(RandSampler::seeded(3)));
        service.bulk_load(10).unwrap();
        service.reset_all().unwrap();

        assert_eq!(service.get_counts().unwrap(), YieldCounts::default());
        assert!(service.get_trend(None, None).unwrap().is_empty());
        assert_eq!(service.ingest_tick().unwrap().id, 0);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let service = service_with(Box::new(RandSampler::seeded(4)));
        service.bulk_load(8).unwrap();

        let recent = service.recent(3).unwrap();
        assert_eq!(recent.iter().map(|r| r.id).collect::<Vec<_>>(), vec![7, 6, 5]);
    }

    #[test]
    fn test_export_csv_rows() {
        let service = service_with(Box::new(RandSampler::seeded(5)));
        service.bulk_load(3).unwrap();

        let csv = service.export_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], export::CSV_HEADER);
        assert!(lines[1].starts_with("0,"));
        assert!(lines[3].starts_with("2,"));
    }
}
