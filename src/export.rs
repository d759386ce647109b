//! CSV export of the full record history.

use crate::store::types::Record;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Header row, in column order.
pub const CSV_HEADER: &str = "id,yield_status,temp_c,pressure_psi,timestamp";

/// Render records as CSV, one row per record in the order given.
///
/// Missing readings and timestamps are written as empty cells. Timestamps
/// are written the way they were stored; instants use RFC3339.
pub fn to_csv(records: &[Record]) -> String {
    let mut out = String::with_capacity(64 * (records.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for record in records {
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            record.id,
            escape(record.status.as_str()),
            optional(record.temp_c),
            optional(record.pressure_psi),
            record
                .timestamp
                .as_ref()
                .map(|ts| escape(&ts.to_string()))
                .unwrap_or_default(),
        );
    }
    out
}

/// File name for a report captured at `now`.
pub fn report_filename(now: DateTime<Utc>) -> String {
    format!("yield_report_{}.csv", now.format("%Y%m%d_%H%M"))
}

/// Write a report into `dir` and return its path.
pub fn write_report(
    dir: &Path,
    records: &[Record],
    now: DateTime<Utc>,
) -> Result<PathBuf, std::io::Error> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(report_filename(now));
    std::fs::write(&path, to_csv(records))?;
    Ok(path)
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Quote a field containing a delimiter, quote or newline.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
