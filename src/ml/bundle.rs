//! Model bundle
//!
//! Immutable set of fitted artifacts, built once at startup and shared
//! read-only by every request. A slot that failed to load stays empty so the
//! forecast path can report exactly which artifact is unavailable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    GradientBoostedTrees, LinearRegressor, LstmRegressor, ModelError, ModelKind, Regressor, Scaler,
};
use crate::error::ForecastError;

/// Serialized form of the tree regressor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeBackend {
    /// JSON tree-ensemble dump
    #[default]
    Gbdt,
    /// bincode-encoded smartcore random forest (`ml` feature)
    Smartcore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub tree: PathBuf,
    pub tree_backend: TreeBackend,
    pub sequence: PathBuf,
    pub fusion: PathBuf,
    pub input_scaler: PathBuf,
    pub output_scaler: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Loaded,
    NotLoaded,
}

impl ArtifactState {
    fn of<T: ?Sized>(slot: &Option<Arc<T>>) -> Self {
        if slot.is_some() {
            ArtifactState::Loaded
        } else {
            ArtifactState::NotLoaded
        }
    }
}

/// Per-artifact load status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub tree: ArtifactState,
    pub sequence: ArtifactState,
    pub fusion: ArtifactState,
    pub input_scaler: ArtifactState,
    pub output_scaler: ArtifactState,
}

impl ModelStatus {
    pub fn all_loaded(&self) -> bool {
        [
            self.tree,
            self.sequence,
            self.fusion,
            self.input_scaler,
            self.output_scaler,
        ]
        .iter()
        .all(|s| *s == ArtifactState::Loaded)
    }
}

#[derive(Clone, Default)]
pub struct ModelBundle {
    tree: Option<Arc<dyn Regressor>>,
    sequence: Option<Arc<dyn Regressor>>,
    fusion: Option<Arc<dyn Regressor>>,
    input_scaler: Option<Arc<Scaler>>,
    output_scaler: Option<Arc<Scaler>>,
}

impl ModelBundle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_tree(mut self, model: Arc<dyn Regressor>) -> Self {
        self.tree = Some(model);
        self
    }

    pub fn with_sequence(mut self, model: Arc<dyn Regressor>) -> Self {
        self.sequence = Some(model);
        self
    }

    pub fn with_fusion(mut self, model: Arc<dyn Regressor>) -> Self {
        self.fusion = Some(model);
        self
    }

    pub fn with_input_scaler(mut self, scaler: Scaler) -> Self {
        self.input_scaler = Some(Arc::new(scaler));
        self
    }

    pub fn with_output_scaler(mut self, scaler: Scaler) -> Self {
        self.output_scaler = Some(Arc::new(scaler));
        self
    }

    /// Load every artifact independently. Failures leave the slot empty.
    pub fn load(paths: &ArtifactPaths) -> Self {
        let tree = match paths.tree_backend {
            TreeBackend::Gbdt => load_slot(ModelKind::Tree, &paths.tree, |p| {
                GradientBoostedTrees::from_path(p).map(|m| Arc::new(m) as Arc<dyn Regressor>)
            }),
            TreeBackend::Smartcore => load_smartcore(&paths.tree),
        };
        let sequence = load_slot(ModelKind::Sequence, &paths.sequence, |p| {
            LstmRegressor::from_path(p).map(|m| Arc::new(m) as Arc<dyn Regressor>)
        });
        let fusion = load_slot(ModelKind::Fusion, &paths.fusion, |p| {
            LinearRegressor::from_path(p).map(|m| Arc::new(m) as Arc<dyn Regressor>)
        });
        let input_scaler = load_slot(ModelKind::InputScaler, &paths.input_scaler, |p| {
            Scaler::from_path(p).map(Arc::new)
        });
        let output_scaler = load_slot(ModelKind::OutputScaler, &paths.output_scaler, |p| {
            Scaler::from_path(p).map(Arc::new)
        });

        let bundle = Self {
            tree,
            sequence,
            fusion,
            input_scaler,
            output_scaler,
        };
        let missing = bundle.missing();
        if missing.is_empty() {
            info!("all model artifacts loaded");
        } else {
            warn!(?missing, "model bundle incomplete, forecasts will fail");
        }
        bundle
    }

    pub fn tree(&self) -> Result<&dyn Regressor, ForecastError> {
        self.tree
            .as_deref()
            .ok_or(ForecastError::ModelUnavailable(ModelKind::Tree))
    }

    pub fn sequence(&self) -> Result<&dyn Regressor, ForecastError> {
        self.sequence
            .as_deref()
            .ok_or(ForecastError::ModelUnavailable(ModelKind::Sequence))
    }

    pub fn fusion(&self) -> Result<&dyn Regressor, ForecastError> {
        self.fusion
            .as_deref()
            .ok_or(ForecastError::ModelUnavailable(ModelKind::Fusion))
    }

    pub fn input_scaler(&self) -> Result<&Scaler, ForecastError> {
        self.input_scaler
            .as_deref()
            .ok_or(ForecastError::ModelUnavailable(ModelKind::InputScaler))
    }

    pub fn output_scaler(&self) -> Result<&Scaler, ForecastError> {
        self.output_scaler
            .as_deref()
            .ok_or(ForecastError::ModelUnavailable(ModelKind::OutputScaler))
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            tree: ArtifactState::of(&self.tree),
            sequence: ArtifactState::of(&self.sequence),
            fusion: ArtifactState::of(&self.fusion),
            input_scaler: ArtifactState::of(&self.input_scaler),
            output_scaler: ArtifactState::of(&self.output_scaler),
        }
    }

    /// Fail with the first unavailable artifact, if any
    pub fn ensure_complete(&self) -> Result<(), ForecastError> {
        match self.missing().first() {
            Some(kind) => Err(ForecastError::ModelUnavailable(*kind)),
            None => Ok(()),
        }
    }

    pub fn missing(&self) -> Vec<ModelKind> {
        let status = self.status();
        [
            (ModelKind::Tree, status.tree),
            (ModelKind::Sequence, status.sequence),
            (ModelKind::Fusion, status.fusion),
            (ModelKind::InputScaler, status.input_scaler),
            (ModelKind::OutputScaler, status.output_scaler),
        ]
        .into_iter()
        .filter(|(_, state)| *state == ArtifactState::NotLoaded)
        .map(|(kind, _)| kind)
        .collect()
    }
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("status", &self.status())
            .finish()
    }
}

fn load_slot<T: ?Sized>(
    kind: ModelKind,
    path: &Path,
    load: impl FnOnce(&Path) -> Result<Arc<T>, ModelError>,
) -> Option<Arc<T>> {
    match load(path) {
        Ok(artifact) => {
            info!(artifact = %kind, path = %path.display(), "artifact loaded");
            Some(artifact)
        }
        Err(e) => {
            warn!(artifact = %kind, path = %path.display(), error = %e, "artifact not loaded");
            None
        }
    }
}

#[cfg(feature = "ml")]
fn load_smartcore(path: &Path) -> Option<Arc<dyn Regressor>> {
    load_slot(ModelKind::Tree, path, |p| {
        super::smartcore::SmartcoreForest::from_path(p).map(|m| Arc::new(m) as Arc<dyn Regressor>)
    })
}

#[cfg(not(feature = "ml"))]
fn load_smartcore(path: &Path) -> Option<Arc<dyn Regressor>> {
    warn!(
        path = %path.display(),
        "smartcore tree backend requested but the `ml` feature is disabled"
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn paths(dir: &TempDir) -> ArtifactPaths {
        ArtifactPaths {
            tree: dir.path().join("tree.json"),
            tree_backend: TreeBackend::Gbdt,
            sequence: dir.path().join("sequence.json"),
            fusion: dir.path().join("fusion.json"),
            input_scaler: dir.path().join("x_scaler.json"),
            output_scaler: dir.path().join("y_scaler.json"),
        }
    }

    #[test]
    fn test_empty_bundle_reports_each_missing_model() {
        let bundle = ModelBundle::empty();
        assert_eq!(
            bundle.tree().err(),
            Some(ForecastError::ModelUnavailable(ModelKind::Tree))
        );
        assert_eq!(
            bundle.output_scaler().err(),
            Some(ForecastError::ModelUnavailable(ModelKind::OutputScaler))
        );
        assert_eq!(bundle.missing().len(), 5);
        assert_eq!(
            bundle.ensure_complete(),
            Err(ForecastError::ModelUnavailable(ModelKind::Tree))
        );
        assert!(!bundle.status().all_loaded());
    }

    #[test]
    fn test_load_partial_bundle() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        write(
            &dir,
            "fusion.json",
            r#"{"coefficients": [0.5, 0.5], "intercept": 0.0}"#,
        );
        write(
            &dir,
            "x_scaler.json",
            r#"{"kind": "min_max", "data_min": [0.0], "data_max": [1.0]}"#,
        );
        write(&dir, "y_scaler.json", "not json");

        let bundle = ModelBundle::load(&p);
        let status = bundle.status();
        assert_eq!(status.fusion, ArtifactState::Loaded);
        assert_eq!(status.input_scaler, ArtifactState::Loaded);
        assert_eq!(status.output_scaler, ArtifactState::NotLoaded);
        assert_eq!(
            bundle.missing(),
            vec![ModelKind::Tree, ModelKind::Sequence, ModelKind::OutputScaler]
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_value(ModelBundle::empty().status()).unwrap();
        assert_eq!(json["tree"], "not_loaded");
    }
}
