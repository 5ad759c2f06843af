use anyhow::Result;
use figment::{providers::{Env, Format, Serialized, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::forecast::EngineSettings;
use crate::ml::{ArtifactPaths, TreeBackend};
use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    #[validate(nested)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    #[validate(nested)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Cleaned hourly CSV produced by the ETL job
    pub path: PathBuf,
    pub timestamp_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/cleaned_bangalore_data.csv"),
            timestamp_column: "_time".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub artifact_dir: PathBuf,
    pub tree_backend: TreeBackend,
    pub tree_file: String,
    pub sequence_file: String,
    pub fusion_file: String,
    pub x_scaler_file: String,
    pub y_scaler_file: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("models"),
            tree_backend: TreeBackend::Gbdt,
            tree_file: "tree_model.json".into(),
            sequence_file: "sequence_model.json".into(),
            fusion_file: "fusion_model.json".into(),
            x_scaler_file: "x_scaler.json".into(),
            y_scaler_file: "y_scaler.json".into(),
        }
    }
}

impl ModelConfig {
    pub fn artifact_paths(&self) -> ArtifactPaths {
        let dir = &self.artifact_dir;
        ArtifactPaths {
            tree: dir.join(&self.tree_file),
            tree_backend: self.tree_backend,
            sequence: dir.join(&self.sequence_file),
            fusion: dir.join(&self.fusion_file),
            input_scaler: dir.join(&self.x_scaler_file),
            output_scaler: dir.join(&self.y_scaler_file),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_history_window"))]
pub struct ForecastConfig {
    pub target_channel: String,
    #[validate(range(min = 1))]
    pub horizon: usize,
    #[validate(range(min = 1))]
    pub n_lookback: usize,
    /// Rows copied into each request's rolling state
    pub history_window: usize,
    #[validate(range(min = 1))]
    pub deadline_ms: u64,
    #[validate(length(min = 1))]
    pub sequence_channels: Vec<String>,
    pub tree_channels: Vec<String>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            target_channel: "Phase3_power".into(),
            horizon: 24,
            n_lookback: 72,
            history_window: 96,
            deadline_ms: 5000,
            sequence_channels: [
                "Phase2_current",
                "Phase2_voltage",
                "Phase3_frequency",
                "Phase3_pf",
                "Phase3_power",
                "Phase3_voltage",
            ]
            .map(String::from)
            .to_vec(),
            tree_channels: [
                "Phase2_current",
                "Phase2_voltage",
                "Phase3_frequency",
                "Phase3_pf",
                "Phase3_voltage",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl ForecastConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            target_channel: self.target_channel.clone(),
            sequence_channels: self.sequence_channels.clone(),
            tree_channels: self.tree_channels.clone(),
            n_lookback: self.n_lookback,
            history_window: self.history_window,
            deadline: Some(self.deadline()),
        }
    }
}

/// Each rolling state must cover the sequence window and the 24h lag + 1
fn validate_history_window(cfg: &ForecastConfig) -> Result<(), ValidationError> {
    if cfg.history_window < cfg.n_lookback || cfg.history_window < 25 {
        let mut err = ValidationError::new("history_window");
        err.message = Some("history_window must be >= n_lookback and >= 25".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AlertsConfig {
    /// MW
    #[validate(range(min = 0.0))]
    pub critical_load_threshold: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            critical_load_threshold: 500.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("HLF__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::from_figment(figment()).unwrap();
        assert_eq!(cfg.forecast.horizon, 24);
        assert_eq!(cfg.forecast.n_lookback, 72);
        assert_eq!(cfg.forecast.history_window, 96);
        assert_eq!(cfg.forecast.tree_channels.len(), 5);
        assert_eq!(cfg.forecast.sequence_channels.len(), 6);
        assert_eq!(cfg.alerts.critical_load_threshold, 500.0);
        assert_eq!(cfg.data.timestamp_column, "_time");
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            [forecast]
            horizon = 12
            deadline_ms = 250

            [model]
            artifact_dir = "/opt/models"
            tree_backend = "smartcore"
        "#;
        let cfg = Config::from_figment(figment().merge(Toml::string(toml))).unwrap();
        assert_eq!(cfg.forecast.horizon, 12);
        assert_eq!(cfg.forecast.n_lookback, 72);
        assert_eq!(cfg.forecast.engine_settings().deadline, Some(Duration::from_millis(250)));

        let paths = cfg.model.artifact_paths();
        assert_eq!(paths.tree, PathBuf::from("/opt/models/tree_model.json"));
        assert_eq!(paths.tree_backend, TreeBackend::Smartcore);
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let toml = "[forecast]\nhorizon = 0\n";
        assert!(Config::from_figment(figment().merge(Toml::string(toml))).is_err());
    }

    #[test]
    fn test_history_window_shorter_than_lookback_rejected() {
        let toml = "[forecast]\nn_lookback = 72\nhistory_window = 48\n";
        assert!(Config::from_figment(figment().merge(Toml::string(toml))).is_err());
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HLF__ALERTS__CRITICAL_LOAD_THRESHOLD", "450.5");
            jail.set_env("HLF__TELEMETRY__FORMAT", "pretty");
            let cfg = Config::from_figment(figment().merge(Env::prefixed("HLF__").split("__")))
                .map_err(|e| e.to_string())?;
            assert_eq!(cfg.alerts.critical_load_threshold, 450.5);
            assert_eq!(cfg.telemetry.format, LogFormat::Pretty);
            Ok(())
        });
    }
}
