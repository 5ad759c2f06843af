//! Forecast service
//!
//! Process-wide entry point for a serving layer. Holds the read-only engine
//! built at startup, or the startup failure that every request then reports.
//! Rollouts run on the blocking pool under a wall-clock timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::alerts;
use super::analytics::{self, DailyDemand, HourlyDemand};
use super::engine::RolloutEngine;
use super::metrics::BacktestReport;
use crate::config::Config;
use crate::domain::{Alert, Forecast, TimeSeriesTable};
use crate::error::{ForecastError, Result};
use crate::ml::{ModelBundle, ModelStatus};
use crate::repo::history;

/// Headroom over the engine's own per-step deadline check
const TIMEOUT_GRACE: Duration = Duration::from_millis(250);

pub struct ForecastService {
    engine: std::result::Result<Arc<RolloutEngine>, ForecastError>,
    status: ModelStatus,
    horizon: usize,
    threshold: f64,
    timeout: Duration,
}

impl ForecastService {
    pub fn new(engine: RolloutEngine, horizon: usize, threshold: f64) -> Self {
        let status = engine.model_status();
        let timeout = engine
            .settings()
            .deadline
            .map_or(Duration::MAX, |d| d.saturating_add(TIMEOUT_GRACE));
        Self {
            engine: Ok(Arc::new(engine)),
            status,
            horizon,
            threshold,
            timeout,
        }
    }

    /// Service whose every forecast fails with `error`
    pub fn unavailable(error: ForecastError, status: ModelStatus, horizon: usize, threshold: f64) -> Self {
        Self {
            engine: Err(error),
            status,
            horizon,
            threshold,
            timeout: Duration::MAX,
        }
    }

    /// Load history and artifacts as configured. Never fails: a startup
    /// error is kept and returned by every later request.
    pub fn from_config(cfg: &Config) -> Self {
        let models = ModelBundle::load(&cfg.model.artifact_paths());
        let status = models.status();
        let horizon = cfg.forecast.horizon;
        let threshold = cfg.alerts.critical_load_threshold;

        let engine = history::load_csv(&cfg.data.path, &cfg.data.timestamp_column)
            .map_err(ForecastError::from)
            .and_then(|table| {
                RolloutEngine::new(Arc::new(table), models, cfg.forecast.engine_settings())
            });

        match engine {
            Ok(engine) => Self::new(engine, horizon, threshold),
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "forecast service unavailable");
                Self::unavailable(e, status, horizon, threshold)
            }
        }
    }

    pub fn engine(&self) -> Result<&Arc<RolloutEngine>> {
        self.engine.as_ref().map_err(Clone::clone)
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_ok() && self.status.all_loaded()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.status
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Forecast `horizon` hours ahead, the configured horizon by default
    pub async fn forecast(&self, horizon: Option<usize>) -> Result<Forecast> {
        let engine = Arc::clone(self.engine()?);
        let horizon = horizon.unwrap_or(self.horizon);
        let request_id = Uuid::new_v4();
        let span = info_span!("forecast", request_id = %request_id, horizon);

        let started = Instant::now();
        let worker_span = span.clone();
        let task = tokio::task::spawn_blocking(move || worker_span.in_scope(|| engine.forecast(horizon)));
        self.await_rollout(task, started).instrument(span).await
    }

    async fn await_rollout(
        &self,
        task: tokio::task::JoinHandle<Result<Forecast>>,
        started: Instant,
    ) -> Result<Forecast> {
        let forecast = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => {
                return Err(ForecastError::ComputationFailure(format!(
                    "forecast worker failed: {}",
                    join
                )))
            }
            Err(_) => {
                return Err(ForecastError::DeadlineExceeded {
                    step: None,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
            }
        };
        info!(
            points = forecast.len(),
            peak = ?forecast.peak().map(|p| p.predicted_power),
            "forecast served"
        );
        Ok(forecast)
    }

    /// Alerts for a fresh forecast at the configured horizon and threshold
    pub async fn check_alerts(&self) -> Result<Vec<Alert>> {
        let forecast = self.forecast(None).await?;
        Ok(self.alerts_for(&forecast))
    }

    pub fn alerts_for(&self, forecast: &Forecast) -> Vec<Alert> {
        alerts::evaluate(&forecast.points, self.threshold)
    }

    pub async fn backtest(&self, hours: usize) -> Result<BacktestReport> {
        let engine = Arc::clone(self.engine()?);
        tokio::task::spawn_blocking(move || engine.backtest(hours))
            .await
            .map_err(|e| ForecastError::ComputationFailure(format!("backtest worker failed: {}", e)))?
    }

    pub fn hourly_pattern(&self) -> Result<Vec<HourlyDemand>> {
        let engine = self.engine()?;
        analytics::hourly_pattern(engine.history(), &engine.settings().target_channel)
    }

    pub fn weekly_trend(&self) -> Result<Vec<DailyDemand>> {
        let engine = self.engine()?;
        analytics::weekly_trend(engine.history(), &engine.settings().target_channel)
    }

    /// Observed rows in `[start, end]`, daily means past `MAX_RANGE_ROWS`
    pub fn historical_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<TimeSeriesTable> {
        analytics::historical_range(self.engine()?.history(), start, end, analytics::MAX_RANGE_ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::EngineSettings;
    use crate::ml::{ArtifactState, LinearRegressor, ModelError, Regressor, Scaler};
    use chrono::TimeZone;
    use ndarray::Array2;

    struct Constant(f64);

    impl Regressor for Constant {
        fn predict(&self, _: &Array2<f64>) -> std::result::Result<f64, ModelError> {
            Ok(self.0)
        }
    }

    struct Stalled;

    impl Regressor for Stalled {
        fn predict(&self, _: &Array2<f64>) -> std::result::Result<f64, ModelError> {
            std::thread::sleep(Duration::from_millis(400));
            Ok(0.0)
        }
    }

    fn history() -> Arc<TimeSeriesTable> {
        let start = Utc.with_ymd_and_hms(2021, 8, 14, 0, 0, 0).unwrap();
        let mut table = TimeSeriesTable::new(vec!["Phase3_power".into(), "Phase3_voltage".into()]).unwrap();
        for i in 0..96 {
            table
                .push(start + chrono::Duration::hours(i), vec![400.0, 230.0])
                .unwrap();
        }
        Arc::new(table)
    }

    fn engine(tree: Arc<dyn Regressor>, deadline: Option<Duration>) -> RolloutEngine {
        let models = ModelBundle::empty()
            .with_tree(tree)
            .with_sequence(Arc::new(Constant(0.5)))
            .with_fusion(Arc::new(LinearRegressor::new(vec![1.0, 0.0], 0.0)))
            .with_input_scaler(Scaler::min_max(vec![0.0, 0.0], vec![1000.0, 1000.0]).unwrap())
            .with_output_scaler(Scaler::min_max(vec![0.0], vec![1000.0]).unwrap());
        let settings = EngineSettings {
            target_channel: "Phase3_power".into(),
            sequence_channels: vec!["Phase3_power".into(), "Phase3_voltage".into()],
            tree_channels: vec!["Phase3_voltage".into()],
            n_lookback: 72,
            history_window: 96,
            deadline,
        };
        RolloutEngine::new(history(), models, settings).unwrap()
    }

    #[tokio::test]
    async fn test_check_alerts_flags_breaches() {
        let service = ForecastService::new(engine(Arc::new(Constant(512.5)), None), 24, 500.0);
        assert!(service.is_ready());

        let alerts = service.check_alerts().await.unwrap();
        assert_eq!(alerts.len(), 24);
        assert_eq!(alerts[0].predicted_power, 512.5);

        let quiet = ForecastService::new(engine(Arc::new(Constant(420.0)), None), 24, 500.0);
        assert!(quiet.check_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forecast_uses_default_horizon() {
        let service = ForecastService::new(engine(Arc::new(Constant(400.0)), None), 24, 500.0);
        assert_eq!(service.forecast(None).await.unwrap().len(), 24);
        assert_eq!(service.forecast(Some(6)).await.unwrap().len(), 6);
    }

    #[test]
    fn test_analytics_over_loaded_history() {
        let service = ForecastService::new(engine(Arc::new(Constant(400.0)), None), 24, 500.0);
        let pattern = service.hourly_pattern().unwrap();
        assert_eq!(pattern.len(), 24);
        assert!(pattern.iter().all(|h| h.avg_demand == 400.0));
        assert_eq!(service.weekly_trend().unwrap().len(), 4);
        assert_eq!(service.historical_range(None, None).unwrap().len(), 96);
    }

    #[tokio::test]
    async fn test_startup_failure_is_returned_to_every_request() {
        let err = ForecastError::DataUnavailable("missing.csv".into());
        let service = ForecastService::unavailable(err.clone(), ModelBundle::empty().status(), 24, 500.0);

        assert!(!service.is_ready());
        assert_eq!(service.forecast(None).await, Err(err.clone()));
        assert_eq!(service.check_alerts().await, Err(err.clone()));
        assert_eq!(service.hourly_pattern(), Err(err));
        assert_eq!(service.model_status().tree, ArtifactState::NotLoaded);
    }

    #[tokio::test]
    async fn test_stalled_regressor_hits_timeout() {
        let service = ForecastService::new(
            engine(Arc::new(Stalled), Some(Duration::from_millis(10))),
            24,
            500.0,
        );
        assert!(matches!(
            service.forecast(None).await,
            Err(ForecastError::DeadlineExceeded { step: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_from_config_without_data_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.data.path = dir.path().join("absent.csv");
        cfg.model.artifact_dir = dir.path().to_path_buf();

        let service = ForecastService::from_config(&cfg);
        assert!(matches!(
            service.forecast(None).await,
            Err(ForecastError::DataUnavailable(_))
        ));
        assert!(!service.model_status().all_loaded());
    }
}
