//! LSTM Sequence Regressor
//!
//! Single recurrent layer followed by a dense head, evaluated over one
//! scaled window. Weight layout follows Keras exports:
//! - `kernel`: (channels, 4 * hidden)
//! - `recurrent_kernel`: (hidden, 4 * hidden)
//! - `bias`: (4 * hidden)
//! - gate blocks ordered input, forget, cell, output
//!
//! The output is in scaled units; callers invert it with the output scaler.

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{ensure_finite, read_json, ArtifactMetadata, ModelError, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmRegressor {
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    /// Window length the model was trained on, if enforced
    #[serde(default)]
    pub sequence_length: Option<usize>,
    pub kernel: Array2<f64>,
    pub recurrent_kernel: Array2<f64>,
    pub bias: Array1<f64>,
    pub dense_kernel: Array1<f64>,
    pub dense_bias: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl LstmRegressor {
    pub fn new(
        kernel: Array2<f64>,
        recurrent_kernel: Array2<f64>,
        bias: Array1<f64>,
        dense_kernel: Array1<f64>,
        dense_bias: f64,
    ) -> Result<Self, ModelError> {
        let model = Self {
            metadata: ArtifactMetadata::default(),
            sequence_length: None,
            kernel,
            recurrent_kernel,
            bias,
            dense_kernel,
            dense_bias,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_json(path)?;
        model.validate()?;
        Ok(model)
    }

    pub fn with_sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = Some(length);
        self
    }

    pub fn input_size(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn hidden_size(&self) -> usize {
        self.recurrent_kernel.nrows()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let hidden = self.hidden_size();
        let gates = 4 * hidden;
        if hidden == 0
            || self.kernel.ncols() != gates
            || self.recurrent_kernel.ncols() != gates
            || self.bias.len() != gates
            || self.dense_kernel.len() != hidden
        {
            return Err(ModelError::InvalidArtifact(format!(
                "inconsistent LSTM weights: kernel {:?}, recurrent {:?}, bias {}, dense {}",
                self.kernel.dim(),
                self.recurrent_kernel.dim(),
                self.bias.len(),
                self.dense_kernel.len()
            )));
        }
        let all_finite = self
            .kernel
            .iter()
            .chain(self.recurrent_kernel.iter())
            .chain(self.bias.iter())
            .chain(self.dense_kernel.iter())
            .all(|w| w.is_finite())
            && self.dense_bias.is_finite();
        if !all_finite {
            return Err(ModelError::InvalidArtifact("non-finite LSTM weight".into()));
        }
        Ok(())
    }
}

impl Regressor for LstmRegressor {
    fn predict(&self, input: &Array2<f64>) -> Result<f64, ModelError> {
        let steps = self.sequence_length.unwrap_or_else(|| input.nrows().max(1));
        if input.ncols() != self.input_size() || input.nrows() != steps {
            return Err(ModelError::ShapeMismatch {
                expected: (steps, self.input_size()),
                actual: input.dim(),
            });
        }

        let hidden = self.hidden_size();
        let mut h = Array1::<f64>::zeros(hidden);
        let mut c = Array1::<f64>::zeros(hidden);

        for x in input.rows() {
            let z = x.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;
            let i = z.slice(s![0..hidden]).mapv(sigmoid);
            let f = z.slice(s![hidden..2 * hidden]).mapv(sigmoid);
            let g = z.slice(s![2 * hidden..3 * hidden]).mapv(f64::tanh);
            let o = z.slice(s![3 * hidden..]).mapv(sigmoid);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
        }

        ensure_finite(h.dot(&self.dense_kernel) + self.dense_bias, "sequence regressor")
    }
}
