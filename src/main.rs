use anyhow::Result;
use hybrid_load_forecaster::{config, forecast::ForecastService, telemetry};
use config::Config;
use serde_json::json;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load()?;
    init_tracing(cfg.telemetry.format);

    info!(
        data = %cfg.data.path.display(),
        artifacts = %cfg.model.artifact_dir.display(),
        "starting hybrid load forecaster"
    );

    let service = ForecastService::from_config(&cfg);
    let status = service.model_status();
    if !status.all_loaded() {
        warn!(?status, "not all model artifacts are loaded");
    }

    let forecast = service.forecast(None).await?;
    let alerts = service.alerts_for(&forecast);

    let report = json!({
        "model_status": status,
        "forecast": forecast,
        "alerts": alerts,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !alerts.is_empty() {
        warn!(count = alerts.len(), "critical load predicted");
    }
    Ok(())
}
