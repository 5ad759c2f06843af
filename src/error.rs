//! Forecasting error taxonomy
//!
//! Every failure inside the engine is surfaced as one `ForecastError`. A
//! forecast is all-or-nothing: no variant ever carries a partial result.

use thiserror::Error;

use crate::ml::{ModelError, ModelKind};

pub type Result<T, E = ForecastError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForecastError {
    /// Historical table missing or unreadable. Fatal at startup.
    #[error("historical data unavailable: {0}")]
    DataUnavailable(String),

    /// A regressor or scaler artifact is not loaded.
    #[error("model unavailable: {0}")]
    ModelUnavailable(ModelKind),

    #[error("insufficient history: need {needed} rows, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    /// Numerical failure inside a regressor or scaler call.
    #[error("computation failure: {0}")]
    ComputationFailure(String),

    /// Rollout ran past its deadline. `step` is the step about to start,
    /// when known.
    #[error("forecast deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { step: Option<usize>, elapsed_ms: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ForecastError {
    /// Stable code for mapping failures onto serving-layer responses
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::DataUnavailable(_) => "data_unavailable",
            ForecastError::ModelUnavailable(_) => "model_unavailable",
            ForecastError::InsufficientHistory { .. } => "insufficient_history",
            ForecastError::ComputationFailure(_) => "computation_failure",
            ForecastError::DeadlineExceeded { .. } => "deadline_exceeded",
            ForecastError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<ModelError> for ForecastError {
    fn from(error: ModelError) -> Self {
        ForecastError::ComputationFailure(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            ForecastError::DataUnavailable("x".into()),
            ForecastError::ModelUnavailable(ModelKind::Tree),
            ForecastError::InsufficientHistory {
                needed: 72,
                available: 10,
            },
            ForecastError::ComputationFailure("nan".into()),
            ForecastError::DeadlineExceeded {
                step: Some(3),
                elapsed_ms: 5001,
            },
            ForecastError::InvalidRequest("horizon".into()),
        ];

        let mut kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_model_error_becomes_computation_failure() {
        let err: ForecastError = ModelError::NonFinite("sequence".into()).into();
        assert_eq!(err.kind(), "computation_failure");
    }

    #[test]
    fn test_error_display() {
        let err = ForecastError::InsufficientHistory {
            needed: 72,
            available: 40,
        };
        assert_eq!(err.to_string(), "insufficient history: need 72 rows, have 40");
    }
}
