//! Pre-fit per-channel linear scalers
//!
//! Parameters come from training and are never re-estimated here. Semantics
//! follow scikit-learn's `MinMaxScaler` and `StandardScaler`, including the
//! rule that a zero range or zero scale is treated as 1.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{read_json, ModelError};

fn unit_range() -> (f64, f64) {
    (0.0, 1.0)
}

fn nonzero(scale: f64) -> f64 {
    if scale.abs() < f64::EPSILON * 10.0 {
        1.0
    } else {
        scale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    MinMax {
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        #[serde(default = "unit_range")]
        feature_range: (f64, f64),
    },
    Standard {
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
}

impl Scaler {
    pub fn min_max(data_min: Vec<f64>, data_max: Vec<f64>) -> Result<Self, ModelError> {
        let scaler = Scaler::MinMax {
            data_min,
            data_max,
            feature_range: unit_range(),
        };
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn standard(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, ModelError> {
        let scaler = Scaler::Standard { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let scaler: Self = read_json(path)?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn n_features(&self) -> usize {
        match self {
            Scaler::MinMax { data_min, .. } => data_min.len(),
            Scaler::Standard { mean, .. } => mean.len(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let (a, b) = match self {
            Scaler::MinMax {
                data_min,
                data_max,
                feature_range,
            } => {
                if !(feature_range.0 < feature_range.1) {
                    return Err(ModelError::InvalidArtifact(format!(
                        "feature_range {:?} is not increasing",
                        feature_range
                    )));
                }
                (data_min, data_max)
            }
            Scaler::Standard { mean, scale } => (mean, scale),
        };
        if a.is_empty() || a.len() != b.len() {
            return Err(ModelError::InvalidArtifact(format!(
                "scaler parameter lengths {} and {}",
                a.len(),
                b.len()
            )));
        }
        if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidArtifact("non-finite scaler parameter".into()));
        }
        Ok(())
    }

    /// `(multiplier, offset)` so that `scaled = raw * multiplier + offset`
    fn coefficients(&self, feature: usize) -> (f64, f64) {
        match self {
            Scaler::MinMax {
                data_min,
                data_max,
                feature_range: (lo, hi),
            } => {
                let scale = (hi - lo) / nonzero(data_max[feature] - data_min[feature]);
                (scale, lo - data_min[feature] * scale)
            }
            Scaler::Standard { mean, scale } => {
                let s = nonzero(scale[feature]);
                (1.0 / s, -mean[feature] / s)
            }
        }
    }

    pub fn transform_value(&self, feature: usize, raw: f64) -> f64 {
        let (m, b) = self.coefficients(feature);
        raw * m + b
    }

    pub fn inverse_value(&self, feature: usize, scaled: f64) -> f64 {
        match self {
            Scaler::MinMax { .. } => {
                let (m, b) = self.coefficients(feature);
                (scaled - b) / m
            }
            Scaler::Standard { mean, scale } => scaled * nonzero(scale[feature]) + mean[feature],
        }
    }

    fn check_width(&self, input: &Array2<f64>) -> Result<(), ModelError> {
        if input.ncols() != self.n_features() {
            return Err(ModelError::ShapeMismatch {
                expected: (input.nrows(), self.n_features()),
                actual: input.dim(),
            });
        }
        Ok(())
    }

    pub fn transform(&self, input: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        self.check_width(input)?;
        let mut out = input.clone();
        for (j, mut col) in out.columns_mut().into_iter().enumerate() {
            col.mapv_inplace(|v| self.transform_value(j, v));
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, input: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        self.check_width(input)?;
        let mut out = input.clone();
        for (j, mut col) in out.columns_mut().into_iter().enumerate() {
            col.mapv_inplace(|v| self.inverse_value(j, v));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    fn assert_close(actual: &Array2<f64>, expected: &Array2<f64>) {
        assert_eq!(actual.dim(), expected.dim());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-12, "{} != {}", a, e);
        }
    }

    #[test]
    fn test_min_max_transform() {
        let scaler = Scaler::min_max(vec![0.0, 10.0], vec![100.0, 30.0]).unwrap();
        let scaled = scaler.transform(&array![[10.0, 20.0], [100.0, 10.0]]).unwrap();
        assert_close(&scaled, &array![[0.1, 0.5], [1.0, 0.0]]);
    }

    #[test]
    fn test_standard_transform() {
        let scaler = Scaler::standard(vec![10.0, 20.0], vec![2.0, 5.0]).unwrap();
        let scaled = scaler.transform(&array![[12.0, 10.0]]).unwrap();
        assert_close(&scaled, &array![[1.0, -2.0]]);
    }

    #[test]
    fn test_zero_range_is_treated_as_unit() {
        let scaler = Scaler::min_max(vec![5.0], vec![5.0]).unwrap();
        assert_eq!(scaler.transform_value(0, 5.0), 0.0);
        assert_eq!(scaler.transform_value(0, 6.0), 1.0);
        assert_eq!(scaler.inverse_value(0, 1.0), 6.0);
    }

    #[test]
    fn test_custom_feature_range() {
        let scaler = Scaler::MinMax {
            data_min: vec![0.0],
            data_max: vec![10.0],
            feature_range: (-1.0, 1.0),
        };
        assert!((scaler.transform_value(0, 0.0) + 1.0).abs() < 1e-12);
        assert!(scaler.transform_value(0, 5.0).abs() < 1e-12);
        assert!((scaler.inverse_value(0, 1.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = Scaler::min_max(vec![0.0], vec![1.0]).unwrap();
        assert!(scaler.transform(&array![[1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Scaler::min_max(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(Scaler::standard(vec![], vec![]).is_err());
        assert!(Scaler::standard(vec![f64::NAN], vec![1.0]).is_err());
    }

    #[test]
    fn test_deserialize_tagged() {
        let json = r#"{"kind": "min_max", "data_min": [0.0], "data_max": [800.0]}"#;
        let scaler: Scaler = serde_json::from_str(json).unwrap();
        assert!((scaler.transform_value(0, 400.0) - 0.5).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_min_max_round_trip(
            lo in -1.0e4f64..1.0e4,
            span in 1.0e-3f64..1.0e4,
            x in -1.0e5f64..1.0e5,
        ) {
            let scaler = Scaler::min_max(vec![lo], vec![lo + span]).unwrap();
            let back = scaler.inverse_value(0, scaler.transform_value(0, x));
            prop_assert!((back - x).abs() <= 1e-6 * x.abs().max(1.0) * (1.0 + span.recip()));
        }

        #[test]
        fn prop_standard_round_trip(
            mean in -1.0e4f64..1.0e4,
            scale in 1.0e-3f64..1.0e4,
            x in -1.0e5f64..1.0e5,
        ) {
            let scaler = Scaler::standard(vec![mean], vec![scale]).unwrap();
            let back = scaler.inverse_value(0, scaler.transform_value(0, x));
            prop_assert!((back - x).abs() <= 1e-9 * (x.abs() + mean.abs()).max(1.0) * (1.0 + scale.recip()));
        }
    }
}
