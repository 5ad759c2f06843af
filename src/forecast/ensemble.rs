//! Three-stage ensemble: tree + sequence regressors, fused by a meta-regressor

use ndarray::{array, Array2};
use serde::{Deserialize, Serialize};

use super::features::{EngineeredRow, TreeFeatureLayout};
use super::window::unscale;
use crate::error::{ForecastError, Result};
use crate::ml::ModelBundle;

/// The three point predictions of one step, physical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub tree: f64,
    pub sequence: f64,
    pub fused: f64,
}

#[derive(Debug, Clone)]
pub struct EnsemblePredictor {
    models: ModelBundle,
    layout: TreeFeatureLayout,
}

impl EnsemblePredictor {
    pub fn new(models: ModelBundle, layout: TreeFeatureLayout) -> Self {
        Self { models, layout }
    }

    pub fn models(&self) -> &ModelBundle {
        &self.models
    }

    pub fn layout(&self) -> &TreeFeatureLayout {
        &self.layout
    }

    /// Predict the next value of the target from both engineered views.
    ///
    /// Every artifact must be present before any model runs: a missing one
    /// fails with `ModelUnavailable` rather than degrading to a subset.
    pub fn predict_next(&self, row: &EngineeredRow, scaled_window: &Array2<f64>) -> Result<EnsemblePrediction> {
        self.models.ensure_complete()?;
        let tree_model = self.models.tree()?;
        let sequence_model = self.models.sequence()?;
        let fusion_model = self.models.fusion()?;
        let output_scaler = self.models.output_scaler()?;

        let tree_input = self.layout.assemble(row)?;
        let tree = tree_model.predict(&tree_input)?;

        let sequence_scaled = sequence_model.predict(scaled_window)?;
        let sequence = unscale(sequence_scaled, output_scaler)?;

        let fused = fusion_model.predict(&array![[tree, sequence]])?;
        if !fused.is_finite() {
            return Err(ForecastError::ComputationFailure(
                "fusion regressor returned a non-finite value".into(),
            ));
        }

        Ok(EnsemblePrediction {
            tree,
            sequence,
            fused,
        })
    }
}
