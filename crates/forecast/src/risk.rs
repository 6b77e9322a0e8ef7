//! Delay risk assessment against a target date.

use burndown_core::{CvBucket, RiskLevel, Time};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::forecaster::ForecastResult;

/// Delay probability and risk classification for one forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Probability (0-100) of finishing after the target; `None` without a target
    pub delay_probability: Option<f64>,

    /// Risk classification
    pub risk_level: RiskLevel,

    /// Distance from prediction to target in margins, when defined
    pub z_score: Option<f64>,
}

/// Maps a forecast and optional deadline to delay risk.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAssessor;

impl RiskAssessor {
    /// Create a new assessor.
    pub fn new() -> Self {
        Self
    }

    /// Assess a forecast against `target_date`.
    ///
    /// Without a target, risk reflects only velocity predictability.
    pub fn assess(&self, forecast: &ForecastResult, target_date: Option<Time>) -> RiskAssessment {
        let Some(target) = target_date else {
            return RiskAssessment {
                delay_probability: None,
                risk_level: risk_from_variability(forecast.cv_bucket),
                z_score: None,
            };
        };

        let distance_ms = (target - forecast.predicted_completion_date).num_milliseconds() as f64;
        let margin_ms = forecast.margin().num_milliseconds() as f64;

        let (z_score, probability) = if margin_ms > 0.0 {
            let z = distance_ms / margin_ms;
            (Some(z), 100.0 * (1.0 - standard_normal_cdf(z)))
        } else if distance_ms >= 0.0 {
            // Zero-width interval: the forecast is a single point in time
            (None, 0.0)
        } else {
            (None, 100.0)
        };

        let delay_probability = clamp_percent(probability);
        RiskAssessment {
            delay_probability: Some(delay_probability),
            risk_level: RiskLevel::from_delay_probability(delay_probability),
            z_score,
        }
    }
}

/// Standard normal cumulative distribution function.
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

fn risk_from_variability(bucket: CvBucket) -> RiskLevel {
    match bucket {
        CvBucket::Low => RiskLevel::Low,
        CvBucket::Medium => RiskLevel::Medium,
        CvBucket::High => RiskLevel::High,
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 100.0;
    }
    value.clamp(0.0, 100.0)
}
