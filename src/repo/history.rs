//! Historical table loader
//!
//! Reads the cleaned hourly CSV produced by the offline ETL job: one
//! timestamp column plus one numeric column per channel.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::domain::{TableError, TimeSeriesTable};
use crate::error::ForecastError;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("timestamp column '{0}' not found")]
    MissingTimestampColumn(String),

    #[error("line {line}: cannot parse timestamp '{value}'")]
    BadTimestamp { line: u64, value: String },

    #[error("line {line}: column '{column}' has non-numeric value '{value}'")]
    BadValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("line {line}: {source}")]
    Table { line: u64, source: TableError },

    #[error("no data rows")]
    Empty,
}

impl From<HistoryError> for ForecastError {
    fn from(error: HistoryError) -> Self {
        ForecastError::DataUnavailable(error.to_string())
    }
}

/// Load the historical table from a CSV file
pub fn load_csv(path: &Path, timestamp_column: &str) -> Result<TimeSeriesTable, HistoryError> {
    let file = File::open(path).map_err(|source| HistoryError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let table = read_csv(BufReader::new(file), timestamp_column)?;
    info!(
        path = %path.display(),
        rows = table.len(),
        channels = table.channels().len(),
        first = ?table.first_timestamp(),
        last = ?table.last_timestamp(),
        "historical data loaded"
    );
    Ok(table)
}

/// Parse CSV from any reader. Columns other than the timestamp become
/// channels, in header order.
pub fn read_csv<R: Read>(reader: R, timestamp_column: &str) -> Result<TimeSeriesTable, HistoryError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();

    let ts_idx = headers
        .iter()
        .position(|h| h == timestamp_column)
        .ok_or_else(|| HistoryError::MissingTimestampColumn(timestamp_column.to_string()))?;
    let channel_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ts_idx)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let channels = channel_cols.iter().map(|(_, name)| name.clone()).collect();
    let mut table = TimeSeriesTable::new(channels).map_err(|source| HistoryError::Table { line: 1, source })?;

    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());

        let raw_ts = record.get(ts_idx).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| HistoryError::BadTimestamp {
            line,
            value: raw_ts.to_string(),
        })?;

        let values = channel_cols
            .iter()
            .map(|(i, name)| {
                let raw = record.get(*i).unwrap_or_default();
                raw.parse::<f64>().map_err(|_| HistoryError::BadValue {
                    line,
                    column: name.clone(),
                    value: raw.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        table
            .push(timestamp, values)
            .map_err(|source| HistoryError::Table { line, source })?;
    }

    if table.is_empty() {
        return Err(HistoryError::Empty);
    }
    Ok(table)
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS[+offset]`, or a naive timestamp taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
