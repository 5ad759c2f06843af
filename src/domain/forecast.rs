use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One rollout step: the fused estimate for an hour after the history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    /// Predicted target channel value, physical units (MW)
    pub predicted_power: f64,
}

/// Ordered multi-step forecast, timestamps ascending and hourly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Last observed timestamp the rollout started from
    pub origin: DateTime<Utc>,
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    pub fn new(origin: DateTime<Utc>, points: Vec<ForecastPoint>) -> Self {
        Self { origin, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.predicted_power).collect()
    }

    /// Highest predicted point
    pub fn peak(&self) -> Option<ForecastPoint> {
        self.points
            .iter()
            .copied()
            .max_by(|a, b| a.predicted_power.total_cmp(&b.predicted_power))
    }

    pub fn average(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().map(|p| p.predicted_power).sum::<f64>() / self.points.len() as f64)
    }
}
