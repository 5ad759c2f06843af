//! Feature engineering for the tree regressor
//!
//! Derives calendar fields plus lag and shifted rolling-mean statistics of the
//! target channel. Every statistic at row `t` uses only rows strictly before
//! `t`; rows without enough history leave the statistic undefined (`None`).

use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::domain::TimeSeriesTable;
use crate::error::{ForecastError, Result};

/// Target lags, in rows (hours)
pub const LAGS: [usize; 3] = [1, 3, 24];

/// Rolling-mean windows, in rows, each shifted by one row
pub const ROLLING_WINDOWS: [usize; 3] = [3, 6, 24];

/// Rows needed for the last row's lag/rolling features to all be defined
pub const MIN_FEATURE_HISTORY: usize = 25;

pub const CALENDAR_FEATURES: [&str; 6] = ["hour", "dayofweek", "month", "quarter", "year", "dayofyear"];

/// Calendar view of a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// Hour of day (0-23)
    pub hour: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Month (1-12)
    pub month: u32,
    /// Quarter (1-4)
    pub quarter: u32,
    pub year: i32,
    /// Day of year (1-366)
    pub day_of_year: u32,
}

impl CalendarFeatures {
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        let month = timestamp.month();
        Self {
            hour: timestamp.hour(),
            day_of_week: timestamp.weekday().num_days_from_monday(),
            month,
            quarter: (month - 1) / 3 + 1,
            year: timestamp.year(),
            day_of_year: timestamp.ordinal(),
        }
    }

    /// Values in `CALENDAR_FEATURES` order
    pub fn values(&self) -> [f64; 6] {
        [
            self.hour as f64,
            self.day_of_week as f64,
            self.month as f64,
            self.quarter as f64,
            self.year as f64,
            self.day_of_year as f64,
        ]
    }
}

/// Lag and rolling statistics of the target, undefined without history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetHistory {
    pub lag_1h: Option<f64>,
    pub lag_3h: Option<f64>,
    pub lag_24h: Option<f64>,
    pub roll_avg_3h: Option<f64>,
    pub roll_avg_6h: Option<f64>,
    pub roll_avg_24h: Option<f64>,
}

impl TargetHistory {
    fn at(values: &[f64], t: usize) -> Self {
        Self {
            lag_1h: lag(values, t, LAGS[0]),
            lag_3h: lag(values, t, LAGS[1]),
            lag_24h: lag(values, t, LAGS[2]),
            roll_avg_3h: shifted_rolling_mean(values, t, ROLLING_WINDOWS[0]),
            roll_avg_6h: shifted_rolling_mean(values, t, ROLLING_WINDOWS[1]),
            roll_avg_24h: shifted_rolling_mean(values, t, ROLLING_WINDOWS[2]),
        }
    }

    /// All six values, or `None` if any is undefined
    pub fn complete(&self) -> Option<[f64; 6]> {
        Some([
            self.lag_1h?,
            self.lag_3h?,
            self.lag_24h?,
            self.roll_avg_3h?,
            self.roll_avg_6h?,
            self.roll_avg_24h?,
        ])
    }
}

/// One timestamp of the enriched table
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRow {
    /// Row index in the source table
    pub position: usize,
    pub timestamp: DateTime<Utc>,
    /// Raw channel values, in source table channel order
    pub raw: Vec<f64>,
    pub calendar: CalendarFeatures,
    pub history: TargetHistory,
}

impl EngineeredRow {
    pub fn is_complete(&self) -> bool {
        self.history.complete().is_some()
    }
}

/// Value `k` rows before `t`
pub fn lag(values: &[f64], t: usize, k: usize) -> Option<f64> {
    t.checked_sub(k).map(|i| values[i])
}

/// Mean of the `window` rows strictly before `t`
pub fn shifted_rolling_mean(values: &[f64], t: usize, window: usize) -> Option<f64> {
    if window == 0 || t < window {
        return None;
    }
    Some(values[t - window..t].iter().sum::<f64>() / window as f64)
}

fn target_values(table: &TimeSeriesTable, target_channel: &str) -> Result<Vec<f64>> {
    let idx = table.channel_index(target_channel).ok_or_else(|| {
        ForecastError::InvalidRequest(format!("target channel '{}' not in table", target_channel))
    })?;
    Ok(table.column(idx).collect())
}

fn engineered_row(table: &TimeSeriesTable, target: &[f64], t: usize) -> EngineeredRow {
    let timestamp = table.timestamp(t);
    EngineeredRow {
        position: t,
        timestamp,
        raw: table.row(t).to_vec(),
        calendar: CalendarFeatures::from_timestamp(timestamp),
        history: TargetHistory::at(target, t),
    }
}

/// Enrich every row of `table`. Pure: the input is never modified.
pub fn derive(table: &TimeSeriesTable, target_channel: &str) -> Result<Vec<EngineeredRow>> {
    let target = target_values(table, target_channel)?;
    Ok((0..table.len())
        .map(|t| engineered_row(table, &target, t))
        .collect())
}

/// Enrich only the most recent row; equal to `derive(..).last()`
pub fn derive_latest(table: &TimeSeriesTable, target_channel: &str) -> Result<EngineeredRow> {
    let target = target_values(table, target_channel)?;
    let last = table.len().checked_sub(1).ok_or(ForecastError::InsufficientHistory {
        needed: MIN_FEATURE_HISTORY,
        available: 0,
    })?;
    Ok(engineered_row(table, &target, last))
}

/// Fixed column order of the tree model's trained feature set:
/// raw channels, then calendar fields, then target lags and rolling means.
///
/// Channel positions are resolved once against the table schema so the
/// order cannot drift between calls.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeFeatureLayout {
    target: String,
    channels: Vec<String>,
    indices: Vec<usize>,
}

impl TreeFeatureLayout {
    pub fn resolve(table_channels: &[String], tree_channels: &[String], target: &str) -> Result<Self> {
        if !table_channels.iter().any(|c| c == target) {
            return Err(ForecastError::InvalidRequest(format!(
                "target channel '{}' not in table",
                target
            )));
        }
        let indices = tree_channels
            .iter()
            .map(|name| {
                table_channels.iter().position(|c| c == name).ok_or_else(|| {
                    ForecastError::InvalidRequest(format!("tree channel '{}' not in table", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            target: target.to_string(),
            channels: tree_channels.to_vec(),
            indices,
        })
    }

    pub fn width(&self) -> usize {
        self.indices.len() + CALENDAR_FEATURES.len() + LAGS.len() + ROLLING_WINDOWS.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.channels.clone();
        names.extend(CALENDAR_FEATURES.iter().map(|s| s.to_string()));
        names.extend(LAGS.iter().map(|h| format!("{}_lag_{}h", self.target, h)));
        names.extend(
            ROLLING_WINDOWS
                .iter()
                .map(|h| format!("{}_roll_avg_{}h", self.target, h)),
        );
        names
    }

    /// Build the `1 x width` model input. Incomplete rows are rejected.
    pub fn assemble(&self, row: &EngineeredRow) -> Result<Array2<f64>> {
        let history = row
            .history
            .complete()
            .ok_or(ForecastError::InsufficientHistory {
                needed: MIN_FEATURE_HISTORY,
                available: row.position + 1,
            })?;

        let mut features = Vec::with_capacity(self.width());
        features.extend(self.indices.iter().map(|&i| row.raw[i]));
        features.extend_from_slice(&row.calendar.values());
        features.extend_from_slice(&history);

        Array2::from_shape_vec((1, features.len()), features)
            .map_err(|e| ForecastError::ComputationFailure(e.to_string()))
    }
}
