//! Autoregressive rollout engine
//!
//! Extends a request-private copy of the recent history one hour at a time.
//! Each step predicts the target channel with the ensemble, then appends a
//! synthetic row in which the target holds the fused prediction and every
//! other channel repeats the previous row (naive persistence).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span};

use super::ensemble::{EnsemblePrediction, EnsemblePredictor};
use super::features::{derive_latest, TreeFeatureLayout, MIN_FEATURE_HISTORY};
use super::metrics::{BacktestReport, ForecastMetrics};
use super::window::{scale, SequenceLayout};
use crate::domain::{Forecast, ForecastPoint, TimeSeriesTable};
use crate::error::{ForecastError, Result};
use crate::ml::{ModelBundle, ModelStatus};

/// Static engine parameters, fixed for the engine's lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub target_channel: String,
    pub sequence_channels: Vec<String>,
    pub tree_channels: Vec<String>,
    pub n_lookback: usize,
    /// Rows of history copied into each request's rolling state
    pub history_window: usize,
    /// Wall-clock budget for one rollout; `None` disables the check
    pub deadline: Option<Duration>,
}

/// Rolling table owned by one request.
///
/// Starts as a copy of the history tail and only ever grows at the end, so
/// it can be cloned at any step to inspect intermediate state.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingState {
    table: TimeSeriesTable,
    target_index: usize,
    observed: usize,
}

impl RollingState {
    fn new(table: TimeSeriesTable, target_index: usize) -> Self {
        let observed = table.len();
        Self {
            table,
            target_index,
            observed,
        }
    }

    pub fn table(&self) -> &TimeSeriesTable {
        &self.table
    }

    /// Rows copied from history, before any synthetic row
    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn synthesized(&self) -> usize {
        self.table.len() - self.observed
    }

    /// Append the row for the next hour with the target set to `value`
    fn extend(&mut self, value: f64) -> Result<ForecastPoint> {
        let (last_ts, last_row) = match (self.table.last_timestamp(), self.table.last_row()) {
            (Some(ts), Some(row)) => (ts, row),
            _ => {
                return Err(ForecastError::InsufficientHistory {
                    needed: 1,
                    available: 0,
                })
            }
        };
        let next_ts = last_ts + chrono::Duration::hours(1);
        let mut next_row = last_row.to_vec();
        next_row[self.target_index] = value;

        self.table
            .push(next_ts, next_row)
            .map_err(|e| ForecastError::ComputationFailure(e.to_string()))?;

        Ok(ForecastPoint {
            timestamp: next_ts,
            predicted_power: value,
        })
    }
}

/// 24-hour style multi-step forecaster over a read-only history
#[derive(Debug, Clone)]
pub struct RolloutEngine {
    history: Arc<TimeSeriesTable>,
    predictor: EnsemblePredictor,
    sequence: SequenceLayout,
    target_index: usize,
    settings: EngineSettings,
}

impl RolloutEngine {
    pub fn new(history: Arc<TimeSeriesTable>, models: ModelBundle, settings: EngineSettings) -> Result<Self> {
        let target_index = history.channel_index(&settings.target_channel).ok_or_else(|| {
            ForecastError::InvalidRequest(format!(
                "target channel '{}' not in table",
                settings.target_channel
            ))
        })?;
        let layout = TreeFeatureLayout::resolve(
            history.channels(),
            &settings.tree_channels,
            &settings.target_channel,
        )?;
        let sequence = SequenceLayout::resolve(
            history.channels(),
            &settings.sequence_channels,
            settings.n_lookback,
        )?;

        let min_history = settings.n_lookback.max(MIN_FEATURE_HISTORY);
        if settings.history_window < min_history {
            return Err(ForecastError::InvalidRequest(format!(
                "history window {} is shorter than the {} rows a step needs",
                settings.history_window, min_history
            )));
        }

        info!(
            rows = history.len(),
            target = %settings.target_channel,
            tree_features = layout.width(),
            sequence_channels = sequence.channels().len(),
            n_lookback = settings.n_lookback,
            "rollout engine ready"
        );

        Ok(Self {
            history,
            predictor: EnsemblePredictor::new(models, layout),
            sequence,
            target_index,
            settings,
        })
    }

    pub fn history(&self) -> &TimeSeriesTable {
        &self.history
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn model_status(&self) -> ModelStatus {
        self.predictor.models().status()
    }

    /// Rows a single prediction step needs: the sequence window or the
    /// longest lag, whichever is larger
    pub fn min_history(&self) -> usize {
        self.settings.n_lookback.max(MIN_FEATURE_HISTORY)
    }

    /// Fresh rolling state: a private copy of the history tail
    pub fn rolling_state(&self) -> Result<RollingState> {
        let table = self.history.tail(self.settings.history_window);
        if table.len() < self.min_history() {
            return Err(ForecastError::InsufficientHistory {
                needed: self.min_history(),
                available: table.len(),
            });
        }
        Ok(RollingState::new(table, self.target_index))
    }

    /// Forecast `horizon` hours past the end of the history
    pub fn forecast(&self, horizon: usize) -> Result<Forecast> {
        let mut state = self.rolling_state()?;
        self.rollout(&mut state, horizon)
    }

    /// Advance `state` by `horizon` steps. All-or-nothing: on failure no
    /// forecast is returned, whatever was appended to `state` so far.
    pub fn rollout(&self, state: &mut RollingState, horizon: usize) -> Result<Forecast> {
        if horizon == 0 {
            return Err(ForecastError::InvalidRequest("horizon must be at least 1".into()));
        }
        let origin: DateTime<Utc> = state.table().last_timestamp().ok_or(
            ForecastError::InsufficientHistory {
                needed: self.min_history(),
                available: 0,
            },
        )?;

        let span = info_span!("rollout", horizon, origin = %origin);
        let _enter = span.enter();

        let started = Instant::now();
        let result = self.run_steps(state, horizon, started);
        match &result {
            Ok(_) => info!(
                horizon,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "rollout complete"
            ),
            Err(e) => error!(error = %e, kind = e.kind(), "rollout aborted"),
        }
        result.map(|points| Forecast::new(origin, points))
    }

    fn run_steps(&self, state: &mut RollingState, horizon: usize, started: Instant) -> Result<Vec<ForecastPoint>> {
        let mut points = Vec::with_capacity(horizon);
        for step in 0..horizon {
            self.check_deadline(step, started)?;

            let prediction = self.predict_step(state.table())?;
            let point = state.extend(prediction.fused)?;
            debug!(
                step,
                timestamp = %point.timestamp,
                tree = prediction.tree,
                sequence = prediction.sequence,
                fused = prediction.fused,
                "rollout step"
            );
            points.push(point);
        }
        Ok(points)
    }

    fn check_deadline(&self, step: usize, started: Instant) -> Result<()> {
        if let Some(deadline) = self.settings.deadline {
            let elapsed = started.elapsed();
            if elapsed > deadline {
                return Err(ForecastError::DeadlineExceeded {
                    step: Some(step),
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
        }
        Ok(())
    }

    /// One ensemble prediction for the hour after the last row of `table`
    pub fn predict_step(&self, table: &TimeSeriesTable) -> Result<EnsemblePrediction> {
        let models = self.predictor.models();
        models.ensure_complete()?;

        if table.channels() != self.history.channels() {
            return Err(ForecastError::InvalidRequest(format!(
                "table channels {:?} differ from history channels {:?}",
                table.channels(),
                self.history.channels()
            )));
        }
        if table.len() < self.min_history() {
            return Err(ForecastError::InsufficientHistory {
                needed: self.min_history(),
                available: table.len(),
            });
        }

        let row = derive_latest(table, &self.settings.target_channel)?;
        let raw_window = self.sequence.window(table)?;
        let scaled_window = scale(&raw_window, models.input_scaler()?)?;

        self.predictor.predict_next(&row, &scaled_window)
    }

    /// Replay the last `hours` observed steps, predicting each one from
    /// strictly earlier rows, and score every ensemble stage.
    pub fn backtest(&self, hours: usize) -> Result<BacktestReport> {
        if hours == 0 {
            return Err(ForecastError::InvalidRequest("backtest needs at least 1 hour".into()));
        }
        let len = self.history.len();
        let needed = self.min_history() + hours;
        if len < needed {
            return Err(ForecastError::InsufficientHistory {
                needed,
                available: len,
            });
        }

        let mut actual = Vec::with_capacity(hours);
        let mut tree = Vec::with_capacity(hours);
        let mut sequence = Vec::with_capacity(hours);
        let mut fused = Vec::with_capacity(hours);

        for t in len - hours..len {
            let start = t.saturating_sub(self.settings.history_window);
            let past = self.history.slice(start, t);
            let prediction = self.predict_step(&past)?;

            actual.push(self.history.value(t, self.target_index));
            tree.push(prediction.tree);
            sequence.push(prediction.sequence);
            fused.push(prediction.fused);
        }

        let score = |predicted: &[f64]| {
            ForecastMetrics::calculate(&actual, predicted)
                .map_err(|e| ForecastError::ComputationFailure(e.to_string()))
        };
        let report = BacktestReport {
            hours,
            tree: score(&tree)?,
            sequence: score(&sequence)?,
            fused: score(&fused)?,
        };
        info!(hours, fused = %report.fused, "backtest complete");
        Ok(report)
    }
}
