//! Machine Learning Module
//!
//! Inference-only view of the fitted models the forecaster consumes:
//! - Gradient-boosted tree regressor over engineered features
//! - LSTM sequence regressor over a scaled window of raw channels
//! - Linear fusion regressor combining the two point predictions
//! - Input/output scalers for the sequence path
//!
//! # Architecture
//! Every regressor sits behind the single-method [`Regressor`] capability so
//! the engine never depends on a concrete model family. Training happens
//! offline; this module only loads and evaluates exported artifacts.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::Display;
use thiserror::Error;

pub mod bundle;
pub mod gbdt;
pub mod linear;
pub mod lstm;
pub mod scaler;

#[cfg(feature = "ml")]
pub mod smartcore;

pub use bundle::{ArtifactPaths, ArtifactState, ModelBundle, ModelStatus, TreeBackend};
pub use gbdt::{GradientBoostedTrees, RegressionTree, TreeNode};
pub use linear::LinearRegressor;
pub use lstm::LstmRegressor;
pub use scaler::Scaler;

/// The artifacts a forecast depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[strum(serialize = "tree regressor")]
    Tree,
    #[strum(serialize = "sequence regressor")]
    Sequence,
    #[strum(serialize = "fusion regressor")]
    Fusion,
    #[strum(serialize = "input scaler")]
    InputScaler,
    #[strum(serialize = "output scaler")]
    OutputScaler,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("input shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("non-finite value produced by {0}")]
    NonFinite(String),

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("model backend failure: {0}")]
    Backend(String),
}

/// Fitted model capability: one fixed-shape input matrix in, one scalar out.
///
/// Tree and fusion models take a single row; sequence models take one row
/// per time step. Implementations must be immutable after load.
#[cfg_attr(test, mockall::automock)]
pub trait Regressor: Send + Sync {
    fn predict(&self, input: &Array2<f64>) -> Result<f64, ModelError>;
}

/// Provenance carried alongside exported artifacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

/// Read and deserialize a JSON artifact
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let bytes = std::fs::read(path)
        .map_err(|e| ModelError::InvalidArtifact(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ModelError::InvalidArtifact(format!("{}: {}", path.display(), e)))
}

pub(crate) fn ensure_finite(value: f64, source: &str) -> Result<f64, ModelError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModelError::NonFinite(source.to_string()))
    }
}

/// Require a single-row input of `width` columns
pub(crate) fn expect_row(input: &Array2<f64>, width: usize) -> Result<(), ModelError> {
    if input.dim() != (1, width) {
        return Err(ModelError::ShapeMismatch {
            expected: (1, width),
            actual: input.dim(),
        });
    }
    Ok(())
}
