use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Time Series Table
// ============================================================================

/// Structural violations when building or extending a table
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TableError {
    #[error("duplicate channel '{0}'")]
    DuplicateChannel(String),

    #[error("row has {actual} values, table has {expected} channels")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("timestamp {next} does not follow {last}")]
    NonIncreasing {
        last: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    #[error("non-finite value in channel '{channel}' at {timestamp}")]
    NonFinite {
        channel: String,
        timestamp: DateTime<Utc>,
    },
}

/// Hourly observations, one row per timestamp, one column per channel.
///
/// Rows are append-only and timestamps strictly increasing. Every stored
/// value is finite; gaps are filled upstream, never represented as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    channels: Vec<String>,
    timestamps: Vec<DateTime<Utc>>,
    rows: Vec<Vec<f64>>,
}

impl TimeSeriesTable {
    pub fn new(channels: Vec<String>) -> Result<Self, TableError> {
        for (i, name) in channels.iter().enumerate() {
            if channels[..i].contains(name) {
                return Err(TableError::DuplicateChannel(name.clone()));
            }
        }
        Ok(Self {
            channels,
            timestamps: Vec::new(),
            rows: Vec::new(),
        })
    }

    pub fn with_capacity(channels: Vec<String>, rows: usize) -> Result<Self, TableError> {
        let mut table = Self::new(channels)?;
        table.timestamps.reserve(rows);
        table.rows.reserve(rows);
        Ok(table)
    }

    /// Append one row
    pub fn push(&mut self, timestamp: DateTime<Utc>, values: Vec<f64>) -> Result<(), TableError> {
        if values.len() != self.channels.len() {
            return Err(TableError::WidthMismatch {
                expected: self.channels.len(),
                actual: values.len(),
            });
        }
        if let Some(last) = self.last_timestamp() {
            if timestamp <= last {
                return Err(TableError::NonIncreasing {
                    last,
                    next: timestamp,
                });
            }
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(TableError::NonFinite {
                channel: self.channels[idx].clone(),
                timestamp,
            });
        }

        self.timestamps.push(timestamp);
        self.rows.push(values);
        Ok(())
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn timestamp(&self, row: usize) -> DateTime<Utc> {
        self.timestamps[row]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.rows[row]
    }

    pub fn value(&self, row: usize, channel: usize) -> f64 {
        self.rows[row][channel]
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    pub fn last_row(&self) -> Option<&[f64]> {
        self.rows.last().map(Vec::as_slice)
    }

    /// All values of one channel, oldest first
    pub fn column(&self, channel: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |r| r[channel])
    }

    /// Iterate `(timestamp, row)` pairs, oldest first
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, &[f64])> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    /// Copy of the last `n` rows (or all rows if fewer)
    pub fn tail(&self, n: usize) -> TimeSeriesTable {
        let start = self.len().saturating_sub(n);
        self.slice(start, self.len())
    }

    /// Copy of rows `start..end`
    pub fn slice(&self, start: usize, end: usize) -> TimeSeriesTable {
        let end = end.min(self.len());
        let start = start.min(end);
        TimeSeriesTable {
            channels: self.channels.clone(),
            timestamps: self.timestamps[start..end].to_vec(),
            rows: self.rows[start..end].to_vec(),
        }
    }
}
