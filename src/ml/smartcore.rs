//! SmartCore tree backend
//!
//! Alternative tree regressor: a smartcore `RandomForestRegressor` exported
//! with bincode. Only restoration and inference live here.

use ndarray::Array2;
use std::path::Path;

use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;

use super::{ensure_finite, ModelError, Regressor};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

pub struct SmartcoreForest {
    model: Forest,
    n_features: usize,
}

impl SmartcoreForest {
    pub fn new(model: Forest, n_features: usize) -> Self {
        Self { model, n_features }
    }

    /// Restore from bincode bytes: a `u64` feature count followed by the forest
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let (n_features, model): (u64, Forest) = bincode::deserialize(bytes)
            .map_err(|e| ModelError::InvalidArtifact(format!("failed to deserialize forest: {}", e)))?;
        Ok(Self::new(model, n_features as usize))
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ModelError::InvalidArtifact(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        bincode::serialize(&(self.n_features as u64, &self.model))
            .map_err(|e| ModelError::Backend(format!("failed to serialize forest: {}", e)))
    }
}

impl Regressor for SmartcoreForest {
    fn predict(&self, input: &Array2<f64>) -> Result<f64, ModelError> {
        super::expect_row(input, self.n_features)?;

        let x = DenseMatrix::new(1, self.n_features, input.iter().copied().collect(), false);
        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| ModelError::Backend(format!("forest prediction failed: {:?}", e)))?;

        let value = predictions
            .first()
            .copied()
            .ok_or_else(|| ModelError::Backend("forest returned no prediction".into()))?;
        ensure_finite(value, "tree regressor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use smartcore::ensemble::random_forest_regressor::RandomForestRegressorParameters;

    fn fitted() -> SmartcoreForest {
        let x = DenseMatrix::new(
            5,
            2,
            vec![1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0, 6.0],
            false,
        );
        let y = vec![3.0, 5.0, 7.0, 9.0, 11.0];
        let params = RandomForestRegressorParameters {
            max_depth: Some(3),
            min_samples_leaf: 1,
            min_samples_split: 2,
            n_trees: 5,
            m: None,
            keep_samples: false,
            seed: 42,
        };
        SmartcoreForest::new(RandomForestRegressor::fit(&x, &y, params).unwrap(), 2)
    }

    #[test]
    fn test_predict_reasonable() {
        let model = fitted();
        let value = model.predict(&array![[3.0, 4.0]]).unwrap();
        assert!(value > 3.0 && value < 11.0);
    }

    #[test]
    fn test_bytes_round_trip_preserves_predictions() {
        let model = fitted();
        let restored = SmartcoreForest::from_bytes(&model.to_bytes().unwrap()).unwrap();
        let input = array![[2.5, 3.5]];
        assert_eq!(model.predict(&input).unwrap(), restored.predict(&input).unwrap());
    }

    #[test]
    fn test_rejects_wrong_width() {
        assert!(fitted().predict(&array![[1.0]]).is_err());
    }
}
