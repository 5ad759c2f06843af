//! Critical-load alert evaluation over a forecast

use crate::domain::{Alert, AlertLevel, ForecastPoint};

/// Default critical load, MW
pub const CRITICAL_LOAD_THRESHOLD: f64 = 500.0;

/// One `critical` alert per point strictly above `threshold`, in forecast
/// order. Empty when nothing exceeds it.
pub fn evaluate(points: &[ForecastPoint], threshold: f64) -> Vec<Alert> {
    points
        .iter()
        .filter(|p| p.predicted_power > threshold)
        .enumerate()
        .map(|(i, p)| Alert {
            id: format!("alert-{}", i + 1),
            timestamp: p.timestamp,
            level: AlertLevel::Critical,
            message: format!(
                "Predicted load {} MW exceeds {} MW threshold at {}.",
                p.predicted_power,
                threshold,
                p.timestamp.format("%Y-%m-%d %H:%M UTC")
            ),
            predicted_power: p.predicted_power,
            threshold,
        })
        .collect()
}
