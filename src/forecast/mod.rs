//! Forecasting Module
//!
//! Hybrid short-term demand forecasting:
//! - Feature derivation (calendar, lag and shifted rolling statistics)
//! - Sequence windowing and scaling for the recurrent model
//! - Three-stage ensemble (tree + sequence, fused by a meta-regressor)
//! - Autoregressive multi-step rollout and backtesting
//! - Critical-load alerts and descriptive analytics
//!
//! # Architecture
//! The engine owns nothing mutable beyond a per-request rolling state; the
//! history and model bundle are shared read-only. The service wraps it for
//! an async host.

pub mod alerts;
pub mod analytics;
pub mod engine;
pub mod ensemble;
pub mod features;
pub mod metrics;
pub mod service;
pub mod window;

pub use alerts::{evaluate, CRITICAL_LOAD_THRESHOLD};
pub use analytics::{historical_range, hourly_pattern, weekly_trend, DailyDemand, HourlyDemand, MAX_RANGE_ROWS};
pub use engine::{EngineSettings, RollingState, RolloutEngine};
pub use ensemble::{EnsemblePrediction, EnsemblePredictor};
pub use features::{derive, derive_latest, EngineeredRow, TreeFeatureLayout};
pub use metrics::{BacktestReport, ForecastMetrics, ForecastQuality};
pub use service::ForecastService;
pub use window::{scale, unscale, window, SequenceLayout};
