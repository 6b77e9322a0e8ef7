//! Prediction model - one immutable forecast result per generation cycle.

use serde::{Deserialize, Serialize};
use crate::error::ForecastError;
use crate::id::{BoardId, PredictionId};
use crate::snapshot::VelocityBasis;
use crate::Time;

/// Confidence level of the completion-date interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ConfidenceLevel {
    /// 90% interval
    #[default]
    P90,
    /// 95% interval
    P95,
    /// 99% interval
    P99,
}

impl ConfidenceLevel {
    /// Two-sided z-value for this level.
    pub fn z_value(&self) -> f64 {
        match self {
            ConfidenceLevel::P90 => 1.645,
            ConfidenceLevel::P95 => 1.960,
            ConfidenceLevel::P99 => 2.576,
        }
    }

    /// Level as a percentage.
    pub fn percent(&self) -> u8 {
        match self {
            ConfidenceLevel::P90 => 90,
            ConfidenceLevel::P95 => 95,
            ConfidenceLevel::P99 => 99,
        }
    }
}

impl TryFrom<u8> for ConfidenceLevel {
    type Error = ForecastError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            90 => Ok(ConfidenceLevel::P90),
            95 => Ok(ConfidenceLevel::P95),
            99 => Ok(ConfidenceLevel::P99),
            other => Err(ForecastError::validation(format!(
                "confidence level must be one of 90, 95, 99 (got {})",
                other
            ))),
        }
    }
}

impl From<ConfidenceLevel> for u8 {
    fn from(level: ConfidenceLevel) -> Self {
        level.percent()
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Direction of recent velocity relative to early velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityTrend {
    /// Recent velocity more than 10% above early velocity
    Increasing,
    /// Within 10%
    Stable,
    /// Recent velocity more than 10% below early velocity
    Decreasing,
}

impl VelocityTrend {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityTrend::Increasing => "increasing",
            VelocityTrend::Stable => "stable",
            VelocityTrend::Decreasing => "decreasing",
        }
    }
}

/// Qualitative bucket of the coefficient of variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvBucket {
    /// CV below 20%
    Low,
    /// CV between 20% and 40%
    Medium,
    /// CV above 40%
    High,
}

impl CvBucket {
    /// Bucket a coefficient of variation expressed in percent.
    pub fn from_cv(cv_percent: f64) -> Self {
        if cv_percent < 20.0 {
            CvBucket::Low
        } else if cv_percent <= 40.0 {
            CvBucket::Medium
        } else {
            CvBucket::High
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CvBucket::Low => "low",
            CvBucket::Medium => "medium",
            CvBucket::High => "high",
        }
    }
}

/// Discrete delay-risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Delay probability below 15%
    Low,
    /// 15% to 30%
    Medium,
    /// 30% to 50%
    High,
    /// Above 50%
    Critical,
}

impl RiskLevel {
    /// Classify a delay probability (0-100).
    pub fn from_delay_probability(probability: f64) -> Self {
        if probability < 15.0 {
            RiskLevel::Low
        } else if probability <= 30.0 {
            RiskLevel::Medium
        } else if probability <= 50.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    /// Ordinal weight, 0 for low through 3 for critical.
    pub fn weight(&self) -> u32 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Kind of actionable suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// Cut or defer scope
    ReduceScope,
    /// Make throughput more predictable
    StabilizeVelocity,
    /// Investigate a falling velocity
    AddressSlowdown,
    /// Add people or time
    IncreaseCapacity,
    /// Improve the team's workflow
    ProcessImprovement,
    /// Watch the forecast more closely
    IncreaseMonitoring,
    /// Keep the current pace
    MaintainPace,
}

impl SuggestionType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::ReduceScope => "reduce_scope",
            SuggestionType::StabilizeVelocity => "stabilize_velocity",
            SuggestionType::AddressSlowdown => "address_slowdown",
            SuggestionType::IncreaseCapacity => "increase_capacity",
            SuggestionType::ProcessImprovement => "process_improvement",
            SuggestionType::IncreaseMonitoring => "increase_monitoring",
            SuggestionType::MaintainPace => "maintain_pace",
        }
    }
}

/// Expected impact or effort of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
}

/// One ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Suggestion kind
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,

    /// Ranking priority (higher first)
    pub priority: u32,

    /// Expected impact on the forecast
    pub impact: Magnitude,

    /// Effort required
    pub effort: Magnitude,

    /// Human-readable recommendation
    pub text: String,
}

/// One forecast result. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurndownPrediction {
    /// Unique identifier
    pub id: PredictionId,

    /// Board forecast
    pub board_id: BoardId,

    /// When the cycle ran
    pub generated_at: Time,

    /// User-supplied or milestone-derived deadline
    pub target_date: Option<Time>,

    /// Interval confidence
    pub confidence_level: ConfidenceLevel,

    /// Unit of velocity and remaining work
    pub basis: VelocityBasis,

    /// Remaining work at generation time
    pub remaining_work: f64,

    /// Point estimate
    pub predicted_completion_date: Time,

    /// Interval lower bound
    pub completion_date_lower_bound: Time,

    /// Interval upper bound
    pub completion_date_upper_bound: Time,

    /// Half-width of the interval in days
    pub days_margin_of_error: f64,

    /// Sample mean velocity per period
    pub velocity_mean: f64,

    /// Sample standard deviation of velocity
    pub velocity_std_dev: f64,

    /// Coefficient of variation in percent
    pub velocity_cv: f64,

    /// Bucketed coefficient of variation
    pub cv_bucket: CvBucket,

    /// Velocity trend
    pub velocity_trend: VelocityTrend,

    /// Number of snapshots used
    pub sample_size: usize,

    /// Probability (0-100) of missing the target, if one was given
    pub delay_probability: Option<f64>,

    /// Risk classification
    pub risk_level: RiskLevel,

    /// Ranked suggestions
    pub actionable_suggestions: Vec<Suggestion>,
}

impl BurndownPrediction {
    /// Whether the interval invariant holds.
    pub fn bounds_are_ordered(&self) -> bool {
        self.completion_date_lower_bound <= self.predicted_completion_date
            && self.predicted_completion_date <= self.completion_date_upper_bound
    }
}
