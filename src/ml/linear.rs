//! Linear fusion regressor
//!
//! The meta-model that turns `(tree_pred, seq_pred)` into the final estimate.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{ensure_finite, expect_row, read_json, ArtifactMetadata, ModelError, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressor {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            metadata: ArtifactMetadata::default(),
            coefficients,
            intercept,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_json(path)?;
        if model.coefficients.is_empty()
            || model.coefficients.iter().any(|c| !c.is_finite())
            || !model.intercept.is_finite()
        {
            return Err(ModelError::InvalidArtifact(format!(
                "{}: coefficients must be finite and non-empty",
                path.display()
            )));
        }
        Ok(model)
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, input: &Array2<f64>) -> Result<f64, ModelError> {
        expect_row(input, self.coefficients.len())?;

        let prediction: f64 = input
            .row(0)
            .iter()
            .zip(self.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum::<f64>()
            + self.intercept;

        ensure_finite(prediction, "fusion regressor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_predict() {
        let model = LinearRegressor::new(vec![0.6, 0.3], 12.0);
        // 0.6*400 + 0.3*300 + 12
        assert!((model.predict(&array![[400.0, 300.0]]).unwrap() - 342.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_shape_mismatch() {
        let model = LinearRegressor::new(vec![0.5, 0.5], 0.0);
        assert!(model.predict(&array![[1.0, 2.0, 3.0]]).is_err());
    }
}
