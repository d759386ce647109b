//! Live and bulk ingestion of synthetic scans into the event log.
//!
//! The live [`Simulator`] runs on its own thread and appends one scan per
//! tick. Each tick finishes its append before the thread waits on the stop
//! channel, so stopping never leaves a half-written record behind, and a
//! stop request is honored within one cadence interval.

use crate::simulator::model::{ScanModel, ScanSampler};
use crate::simulator::stats::{IngestStats, SharedIngestStats};
use crate::store::{EventLog, Record, StoreError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Capacity of the channel carrying appended records to observers.
const RECORD_CHANNEL_CAPACITY: usize = 10_000;

/// Configuration for the ingestion generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Delay between live ticks
    #[serde(with = "duration_millis")]
    pub cadence: Duration,
    /// Status model and reading ranges
    #[serde(flatten)]
    pub model: ScanModel,
    /// Default record count for a bulk load
    pub bulk_records: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(1),
            model: ScanModel::default(),
            bulk_records: 500,
        }
    }
}

/// Errors from controlling the live generator.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error("simulator is already running")]
    AlreadyRunning,
    #[error("failed to spawn simulator thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Draw one scan and append it.
pub fn ingest_tick(
    log: &EventLog,
    model: &ScanModel,
    sampler: &mut dyn ScanSampler,
) -> Result<Record, StoreError> {
    let scan = model.sample(sampler);
    log.append(scan.status, scan.temp_c, scan.pressure_psi)
}

/// Append `num_records` scans in one transaction and return them.
pub fn bulk_load(
    log: &EventLog,
    model: &ScanModel,
    sampler: &mut dyn ScanSampler,
    num_records: usize,
) -> Result<Vec<Record>, StoreError> {
    let scans: Vec<_> = (0..num_records).map(|_| model.sample(sampler)).collect();
    let records = log.append_batch(&scans)?;
    tracing::info!("Bulk loaded {} records", records.len());
    Ok(records)
}

/// Background writer appending one synthetic scan per tick.
pub struct Simulator {
    config: SimulatorConfig,
    log: Arc<EventLog>,
    stats: SharedIngestStats,
    sender: Sender<Record>,
    receiver: Receiver<Record>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Create a stopped simulator writing to `log`.
    pub fn new(config: SimulatorConfig, log: Arc<EventLog>) -> Self {
        let (sender, receiver) = bounded(RECORD_CHANNEL_CAPACITY);
        Self {
            config,
            log,
            stats: Arc::new(IngestStats::new()),
            sender,
            receiver,
            stop_tx: None,
            handle: None,
        }
    }

    /// Start the ingest thread.
    pub fn start(&mut self, sampler: Box<dyn ScanSampler>) -> Result<(), SimulatorError> {
        if self.is_running() {
            return Err(SimulatorError::AlreadyRunning);
        }
        // Reap a thread that exited on its own.
        self.stop();
        self.stats = Arc::new(IngestStats::new());

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let worker = Worker {
            log: Arc::clone(&self.log),
            model: self.config.model.clone(),
            cadence: self.config.cadence,
            sampler,
            stats: Arc::clone(&self.stats),
            sender: self.sender.clone(),
            stop_rx,
        };

        let handle = thread::Builder::new()
            .name("yield-simulator".to_string())
            .spawn(move || worker.run())?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the ingest thread and wait for it to exit.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel and wakes the worker.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Simulator thread panicked");
            }
        }
    }

    /// Check if the ingest thread is currently running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Get the receiver for appended records.
    pub fn receiver(&self) -> &Receiver<Record> {
        &self.receiver
    }

    /// Counters for the current (or most recent) run.
    pub fn stats(&self) -> &SharedIngestStats {
        &self.stats
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    log: Arc<EventLog>,
    model: ScanModel,
    cadence: Duration,
    sampler: Box<dyn ScanSampler>,
    stats: SharedIngestStats,
    sender: Sender<Record>,
    stop_rx: Receiver<()>,
}

impl Worker {
    fn run(mut self) {
        tracing::info!(
            "Live simulation started (cadence {}ms)",
            self.cadence.as_millis()
        );

        loop {
            match ingest_tick(&self.log, &self.model, self.sampler.as_mut()) {
                Ok(record) => {
                    self.stats.record_scan(&record);
                    // Observers are optional; a full channel just drops the notification.
                    let _ = self.sender.try_send(record);
                }
                Err(e) => {
                    self.stats.record_append_failure();
                    tracing::warn!("Scan append failed, continuing on next tick: {}", e);
                }
            }

            match self.stop_rx.recv_timeout(self.cadence) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Live simulation stopped");
    }
}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::model::{RandSampler, ScriptedSampler};
    use crate::store::{SnapshotOrder, YieldStatus};
    use std::time::Instant;

    fn fast_config() -> SimulatorConfig {
        SimulatorConfig {
            cadence: Duration::from_millis(10),
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn test_ingest_tick_appends_scripted_scan() {
        let log = EventLog::open_in_memory().unwrap();
        let model = ScanModel::default();
        let mut sampler = ScriptedSampler::from_scans(&[(209.0, 30.0, 0.9)]);

        let record = ingest_tick(&log, &model, &mut sampler).unwrap();
        assert_eq!(record.id, 0);
        assert_eq!(record.status, YieldStatus::Fail);
        assert_eq!(log.count().unwrap(), 1);
    }

    #[test]
    fn test_bulk_load_appends_all() {
        let log = EventLog::open_in_memory().unwrap();
        let records = bulk_load(
            &log,
            &ScanModel::default(),
            &mut RandSampler::seeded(1),
            500,
        )
        .unwrap();

        assert_eq!(records.len(), 500);
        assert_eq!(log.count().unwrap(), 500);
        assert_eq!(records.last().unwrap().id, 499);
    }

    #[test]
    fn test_simulator_appends_and_stops() {
        let log = Arc::new(EventLog::open_in_memory().unwrap());
        let mut simulator = Simulator::new(fast_config(), Arc::clone(&log));

        simulator.start(Box::new(RandSampler::seeded(3))).unwrap();
        assert!(simulator.is_running());
        assert!(matches!(
            simulator.start(Box::new(RandSampler::seeded(4))),
            Err(SimulatorError::AlreadyRunning)
        ));

        let first = simulator
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(first.id, 0);

        let stopped_at = Instant::now();
        simulator.stop();
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert!(!simulator.is_running());

        let count = log.count().unwrap();
        assert!(count >= 1);
        assert_eq!(simulator.stats().snapshot().scans_appended, count);

        // Nothing is appended after stop returns.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(log.count().unwrap(), count);

        let ids: Vec<i64> = log
            .snapshot(SnapshotOrder::Ascending, None)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, (0..count as i64).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_latency_is_bounded_by_cadence() {
        let log = Arc::new(EventLog::open_in_memory().unwrap());
        let config = SimulatorConfig {
            cadence: Duration::from_secs(30),
            ..SimulatorConfig::default()
        };
        let mut simulator = Simulator::new(config, log);
        simulator.start(Box::new(RandSampler::seeded(5))).unwrap();
        simulator
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();

        let stopped_at = Instant::now();
        simulator.stop();
        assert!(stopped_at.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_simulator_restarts_after_stop() {
        let log = Arc::new(EventLog::open_in_memory().unwrap());
        let mut simulator = Simulator::new(fast_config(), Arc::clone(&log));

        simulator.start(Box::new(RandSampler::seeded(8))).unwrap();
        simulator
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        simulator.stop();
        let first_run = log.count().unwrap();
        let first_started = simulator.stats().snapshot().started_at;
        assert_eq!(simulator.stats().snapshot().scans_appended, first_run);

        simulator.start(Box::new(RandSampler::seeded(9))).unwrap();
        assert!(simulator.is_running());
        while simulator.receiver().try_recv().is_ok() {}
        simulator
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        simulator.stop();

        // Counters cover the second run only.
        let second = simulator.stats().snapshot();
        assert_eq!(second.scans_appended, log.count().unwrap() - first_run);
        assert!(second.started_at >= first_started);
        assert_eq!(second.append_failures, 0);
    }

    #[test]
    fn test_failed_appends_are_counted_and_ingest_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factory_data.db");
        let log = Arc::new(EventLog::open(&path).unwrap());
        let mut simulator = Simulator::new(fast_config(), Arc::clone(&log));

        simulator.start(Box::new(RandSampler::seeded(11))).unwrap();
        simulator
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();

        // Pull the table out from under the writer through a second connection.
        let other = rusqlite::Connection::open(&path).unwrap();
        other.busy_timeout(Duration::from_secs(5)).unwrap();
        other
            .execute_batch("DROP TABLE manufacturing_yield")
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while simulator.stats().snapshot().append_failures < 3 {
            assert!(Instant::now() < deadline, "append failures were not counted");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(simulator.is_running());

        other
            .execute_batch(
                "CREATE TABLE manufacturing_yield (
                    id INTEGER PRIMARY KEY,
                    yield_status TEXT NOT NULL,
                    temp_c REAL,
                    pressure_psi REAL,
                    timestamp TEXT
                )",
            )
            .unwrap();

        while log.count().unwrap_or(0) == 0 {
            assert!(Instant::now() < deadline, "ingest did not resume");
            std::thread::sleep(Duration::from_millis(10));
        }
        simulator.stop();

        let records = log.snapshot(SnapshotOrder::Ascending, None).unwrap();
        assert_eq!(records[0].id, 0);
    }

    #[test]
    fn test_config_serializes_cadence_as_millis() {
        let json = serde_json::to_value(SimulatorConfig::default()).unwrap();
        assert_eq!(json["cadence"], 1000);
        assert_eq!(json["fail_threshold_c"], 208.0);

        let parsed: SimulatorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, SimulatorConfig::default());
    }
}
