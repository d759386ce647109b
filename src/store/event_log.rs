//! Append-only SQLite event log of scan records.
//!
//! The log owns a single connection behind a mutex. Every operation takes
//! the lock for its full duration, so appends, resets and snapshot reads
//! are atomic with respect to each other: a snapshot sees a prefix of the
//! appends and never a half-applied reset.
//!
//! Writes open an `IMMEDIATE` transaction so that two processes sharing the
//! same database file (a live simulator and a query server, say) cannot both
//! claim the same next id.

use crate::store::types::{Record, Scan, SnapshotOrder, Timestamp, YieldStatus};
use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Table holding the scan records.
pub const TABLE_NAME: &str = "manufacturing_yield";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS manufacturing_yield (
        id INTEGER PRIMARY KEY,
        yield_status TEXT NOT NULL,
        temp_c REAL,
        pressure_psi REAL,
        timestamp TEXT
    )
";

const SELECT_COLUMNS: &str = "SELECT id, yield_status, temp_c, pressure_psi, timestamp FROM manufacturing_yield";

/// Errors raised by the event log.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying store could not be opened, read or written.
    #[error("storage unavailable during {operation}: {reason}")]
    StorageUnavailable {
        operation: &'static str,
        reason: String,
    },
}

impl StoreError {
    fn unavailable(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |e| StoreError::StorageUnavailable {
            operation,
            reason: e.to_string(),
        }
    }
}

/// Ordered, append-only store of [`Record`]s.
pub struct EventLog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl EventLog {
    /// Open (or create) a file-backed log.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::StorageUnavailable {
                operation: "open",
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(StoreError::unavailable("open"))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(StoreError::unavailable("open"))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(StoreError::unavailable("open"))?;

        let log = Self::with_connection(conn, Some(path.to_path_buf()))?;
        tracing::info!("Opened event log at {}", path.display());
        Ok(log)
    }

    /// Open a private in-memory log.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::unavailable("open"))?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(StoreError::unavailable("open"))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file backing this log, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one scan, assigning the next id and stamping the current time.
    pub fn append(
        &self,
        status: YieldStatus,
        temp_c: f64,
        pressure_psi: f64,
    ) -> Result<Record, StoreError> {
        let scan = Scan {
            status,
            temp_c,
            pressure_psi,
        };
        let mut records = self.append_batch(std::slice::from_ref(&scan))?;
        records.pop().ok_or(StoreError::StorageUnavailable {
            operation: "append",
            reason: "insert produced no record".to_string(),
        })
    }

    /// Append several scans in one transaction.
    ///
    /// Either every scan is stored, with consecutive ids, or none is.
    pub fn append_batch(&self, scans: &[Scan]) -> Result<Vec<Record>, StoreError> {
        let mut conn = self.lock("append")?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::unavailable("append"))?;

        let max_id: Option<i64> = tx
            .query_row("SELECT MAX(id) FROM manufacturing_yield", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::unavailable("append"))?;
        let mut next_id = max_id.map_or(0, |id| id + 1);

        let mut records = Vec::with_capacity(scans.len());
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO manufacturing_yield (id, yield_status, temp_c, pressure_psi, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(StoreError::unavailable("append"))?;

            for scan in scans {
                let timestamp = Utc::now();
                stmt.execute(params![
                    next_id,
                    scan.status.as_str(),
                    scan.temp_c,
                    scan.pressure_psi,
                    timestamp.to_rfc3339(),
                ])
                .map_err(StoreError::unavailable("append"))?;

                records.push(Record {
                    id: next_id,
                    status: scan.status.clone(),
                    temp_c: Some(scan.temp_c),
                    pressure_psi: Some(scan.pressure_psi),
                    timestamp: Some(Timestamp::At(timestamp)),
                });
                next_id += 1;
            }
        }

        tx.commit().map_err(StoreError::unavailable("append"))?;
        Ok(records)
    }

    /// Consistent point-in-time view of the log.
    ///
    /// `limit` keeps the first `limit` records in the requested order, so a
    /// descending snapshot with a limit returns the most recent records.
    pub fn snapshot(
        &self,
        order: SnapshotOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = self.lock("snapshot")?;

        let direction = match order {
            SnapshotOrder::Ascending => "ASC",
            SnapshotOrder::Descending => "DESC",
        };
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let sql = format!("{SELECT_COLUMNS} ORDER BY id {direction} LIMIT ?1");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(StoreError::unavailable("snapshot"))?;
        let rows = stmt
            .query_map(params![limit], row_to_record)
            .map_err(StoreError::unavailable("snapshot"))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::unavailable("snapshot"))
    }

    /// Look up a single record by id.
    pub fn get(&self, id: i64) -> Result<Option<Record>, StoreError> {
        let conn = self.lock("get")?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()
        .map_err(StoreError::unavailable("get"))
    }

    /// Number of records currently stored.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock("count")?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM manufacturing_yield", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::unavailable("count"))?;
        Ok(count.max(0) as u64)
    }

    /// Remove every record. The next append restarts ids at 0.
    pub fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self.lock("reset")?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::unavailable("reset"))?;
        let removed = tx
            .execute("DELETE FROM manufacturing_yield", [])
            .map_err(StoreError::unavailable("reset"))?;
        tx.commit().map_err(StoreError::unavailable("reset"))?;

        tracing::info!("Event log reset ({} records removed)", removed);
        Ok(())
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::StorageUnavailable {
            operation,
            reason: "connection lock poisoned".to_string(),
        })
    }
}

/// Decode one row. Optional columns holding values of the wrong type read
/// as missing instead of failing the whole snapshot.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        status: YieldStatus::from(text_column(row, 1)?.unwrap_or_default()),
        temp_c: real_column(row, 2)?,
        pressure_psi: real_column(row, 3)?,
        timestamp: text_column(row, 4)?.map(Timestamp::from),
    })
}

fn real_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<f64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Real(v) => Some(v),
        ValueRef::Integer(v) => Some(v as f64),
        ValueRef::Text(_) | ValueRef::Blob(_) | ValueRef::Null => None,
    })
}

fn text_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Blob(_) | ValueRef::Null => None,
    })
}
