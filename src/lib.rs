//! Hybrid short-term power demand forecaster.
//!
//! A gradient-boosted tree over engineered features and an LSTM over a
//! scaled window of raw channels, fused by a linear meta-model and rolled
//! forward autoregressively 24 hours.

pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ml;
pub mod repo;
pub mod telemetry;

pub use error::{ForecastError, Result};
