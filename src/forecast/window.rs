//! Sequence windowing and scaling for the sequence regressor

use ndarray::Array2;

use crate::domain::TimeSeriesTable;
use crate::error::{ForecastError, Result};
use crate::ml::Scaler;

/// Channel positions and window length, resolved once against a table schema
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceLayout {
    channels: Vec<String>,
    indices: Vec<usize>,
    n_lookback: usize,
}

impl SequenceLayout {
    pub fn resolve(table_channels: &[String], channels: &[String], n_lookback: usize) -> Result<Self> {
        if n_lookback == 0 {
            return Err(ForecastError::InvalidRequest("n_lookback must be positive".into()));
        }
        if channels.is_empty() {
            return Err(ForecastError::InvalidRequest("no sequence channels configured".into()));
        }
        let indices = channels
            .iter()
            .map(|name| {
                table_channels.iter().position(|c| c == name).ok_or_else(|| {
                    ForecastError::InvalidRequest(format!("sequence channel '{}' not in table", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            channels: channels.to_vec(),
            indices,
            n_lookback,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn n_lookback(&self) -> usize {
        self.n_lookback
    }

    /// Last `n_lookback` rows restricted to the layout's channels
    pub fn window(&self, table: &TimeSeriesTable) -> Result<Array2<f64>> {
        if table.len() < self.n_lookback {
            return Err(ForecastError::InsufficientHistory {
                needed: self.n_lookback,
                available: table.len(),
            });
        }
        let start = table.len() - self.n_lookback;
        Ok(Array2::from_shape_fn(
            (self.n_lookback, self.indices.len()),
            |(r, c)| table.value(start + r, self.indices[c]),
        ))
    }
}

/// Trailing `n_lookback x channels` window of raw values
pub fn window(table: &TimeSeriesTable, channels: &[String], n_lookback: usize) -> Result<Array2<f64>> {
    SequenceLayout::resolve(table.channels(), channels, n_lookback)?.window(table)
}

/// Apply the pre-fit input scaler per channel
pub fn scale(raw_window: &Array2<f64>, x_scaler: &Scaler) -> Result<Array2<f64>> {
    let scaled = x_scaler.transform(raw_window)?;
    if scaled.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::ComputationFailure(
            "non-finite value in scaled window".into(),
        ));
    }
    Ok(scaled)
}

/// Invert the target scaler on one scalar model output
pub fn unscale(value: f64, y_scaler: &Scaler) -> Result<f64> {
    if y_scaler.n_features() != 1 {
        return Err(ForecastError::ComputationFailure(format!(
            "output scaler has {} features, expected 1",
            y_scaler.n_features()
        )));
    }
    let physical = y_scaler.inverse_value(0, value);
    if !physical.is_finite() {
        return Err(ForecastError::ComputationFailure(
            "non-finite unscaled sequence prediction".into(),
        ));
    }
    Ok(physical)
}
