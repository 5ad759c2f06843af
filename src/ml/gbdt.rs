//! Gradient-Boosted Tree Regressor
//!
//! Evaluates an exported additive tree ensemble: the prediction is
//! `base_score` plus one leaf value per tree. Splits send `x < threshold`
//! to the left child, matching the XGBoost dump convention.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{ensure_finite, expect_row, read_json, ArtifactMetadata, ModelError, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// One tree, node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Walk from the root to a leaf. Bounded by the node count so a
    /// malformed tree that skipped `validate` errors instead of looping.
    fn evaluate(&self, features: &[f64]) -> Result<f64, ModelError> {
        let mut idx = 0;
        for _ in 0..self.nodes.len() {
            let node = self.nodes.get(idx).ok_or_else(|| {
                ModelError::InvalidArtifact(format!("child index {} out of range", idx))
            })?;
            match *node {
                TreeNode::Leaf { value } => return Ok(value),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = features.get(feature).ok_or_else(|| {
                        ModelError::InvalidArtifact(format!("split on missing feature {}", feature))
                    })?;
                    idx = if *x < threshold { left } else { right };
                }
            }
        }
        Err(ModelError::InvalidArtifact("tree path does not reach a leaf".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    pub n_features: usize,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn new(n_features: usize, base_score: f64, trees: Vec<RegressionTree>) -> Result<Self, ModelError> {
        let model = Self {
            metadata: ArtifactMetadata::default(),
            n_features,
            base_score,
            trees,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_json(path)?;
        model.validate()?;
        Ok(model)
    }

    /// Check structure so evaluation can never index out of bounds or cycle.
    ///
    /// Children must point forward, which also rules out cycles.
    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.metadata.feature_names.is_empty()
            && self.metadata.feature_names.len() != self.n_features
        {
            return Err(ModelError::InvalidArtifact(format!(
                "{} feature names for {} features",
                self.metadata.feature_names.len(),
                self.n_features
            )));
        }
        if !self.base_score.is_finite() {
            return Err(ModelError::InvalidArtifact("non-finite base_score".into()));
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::InvalidArtifact(format!("tree {} is empty", t)));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match *node {
                    TreeNode::Leaf { value } if !value.is_finite() => {
                        return Err(ModelError::InvalidArtifact(format!(
                            "tree {} node {}: non-finite leaf",
                            t, i
                        )));
                    }
                    TreeNode::Leaf { .. } => {}
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        let n = tree.nodes.len();
                        if feature >= self.n_features
                            || !threshold.is_finite()
                            || left <= i
                            || right <= i
                            || left >= n
                            || right >= n
                        {
                            return Err(ModelError::InvalidArtifact(format!(
                                "tree {} node {}: malformed split",
                                t, i
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Regressor for GradientBoostedTrees {
    fn predict(&self, input: &Array2<f64>) -> Result<f64, ModelError> {
        expect_row(input, self.n_features)?;
        let row = input.row(0);
        let features = row
            .as_slice()
            .ok_or_else(|| ModelError::Backend("feature row is not contiguous".into()))?;

        if features.iter().any(|f| !f.is_finite()) {
            return Err(ModelError::NonFinite("tree regressor input".into()));
        }

        let mut score = self.base_score;
        for tree in &self.trees {
            score += tree.evaluate(features)?;
        }
        ensure_finite(score, "tree regressor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn stump(feature: usize, threshold: f64, low: f64, high: f64) -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        }
    }

    #[test]
    fn test_predict_sums_trees() {
        let model = GradientBoostedTrees::new(
            2,
            100.0,
            vec![stump(0, 10.0, -5.0, 5.0), stump(1, 0.5, 1.0, 2.0)],
        )
        .unwrap();

        assert_eq!(model.predict(&array![[3.0, 0.9]]).unwrap(), 100.0 - 5.0 + 2.0);
        // Equal to threshold goes right
        assert_eq!(model.predict(&array![[10.0, 0.1]]).unwrap(), 100.0 + 5.0 + 1.0);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let model = GradientBoostedTrees::new(2, 0.0, vec![stump(0, 1.0, 0.0, 1.0)]).unwrap();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0, 3.0]]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_nan_input() {
        let model = GradientBoostedTrees::new(1, 0.0, vec![stump(0, 1.0, 0.0, 1.0)]).unwrap();
        assert!(matches!(
            model.predict(&array![[f64::NAN]]),
            Err(ModelError::NonFinite(_))
        ));
    }

    #[test]
    fn test_validate_rejects_backward_child() {
        let tree = RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 0,
                    right: 1,
                },
                TreeNode::Leaf { value: 1.0 },
            ],
        };
        assert!(GradientBoostedTrees::new(1, 0.0, vec![tree]).is_err());
        assert!(GradientBoostedTrees::new(1, 0.0, vec![stump(3, 1.0, 0.0, 1.0)]).is_err());
    }

    #[test]
    fn test_unvalidated_malformed_tree_errors() {
        let json = r#"{
            "n_features": 1,
            "trees": [{"nodes": [
                {"type": "split", "feature": 4, "threshold": 2.0, "left": 1, "right": 9},
                {"type": "leaf", "value": 1.0}
            ]}]
        }"#;
        let model: GradientBoostedTrees = serde_json::from_str(json).unwrap();
        assert!(matches!(
            model.predict(&array![[5.0]]),
            Err(ModelError::InvalidArtifact(_))
        ));

        let cyclic = GradientBoostedTrees {
            metadata: ArtifactMetadata::default(),
            n_features: 1,
            base_score: 0.0,
            trees: vec![RegressionTree {
                nodes: vec![TreeNode::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 0,
                    right: 0,
                }],
            }],
        };
        assert!(cyclic.predict(&array![[0.0]]).is_err());
    }

    #[test]
    fn test_deserialize_dump() {
        let json = r#"{
            "n_features": 1,
            "base_score": 0.5,
            "trees": [{"nodes": [
                {"type": "split", "feature": 0, "threshold": 2.0, "left": 1, "right": 2},
                {"type": "leaf", "value": 1.0},
                {"type": "leaf", "value": 3.0}
            ]}]
        }"#;
        let model: GradientBoostedTrees = serde_json::from_str(json).unwrap();
        model.validate().unwrap();
        assert_eq!(model.predict(&array![[5.0]]).unwrap(), 3.5);
    }
}
