//! Prediction persistence.

use std::sync::Arc;

use burndown_core::{
    AlertTransition, BoardId, BurndownPrediction, PredictionId, Suggestion, Time,
};
use burndown_forecast::{ForecastResult, RiskAssessment};
use burndown_storage::{CycleCommit, Storage};
use tracing::info;

use crate::error::Result;

/// Computed results of one generation cycle, ready to persist.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Board forecast
    pub board_id: BoardId,
    /// Forecast statistics
    pub forecast: ForecastResult,
    /// Risk against the target
    pub assessment: RiskAssessment,
    /// Ranked suggestions
    pub suggestions: Vec<Suggestion>,
    /// Deadline the risk was assessed against
    pub target_date: Option<Time>,
    /// When the cycle ran
    pub generated_at: Time,
}

impl CycleOutcome {
    /// Assemble the prediction record.
    pub fn to_prediction(&self) -> BurndownPrediction {
        let f = &self.forecast;
        BurndownPrediction {
            id: PredictionId::new(),
            board_id: self.board_id.clone(),
            generated_at: self.generated_at,
            target_date: self.target_date,
            confidence_level: f.confidence_level,
            basis: f.basis,
            remaining_work: f.remaining_work,
            predicted_completion_date: f.predicted_completion_date,
            completion_date_lower_bound: f.lower_bound,
            completion_date_upper_bound: f.upper_bound,
            days_margin_of_error: f.days_margin_of_error,
            velocity_mean: f.velocity_mean,
            velocity_std_dev: f.velocity_std_dev,
            velocity_cv: f.cv_percent,
            cv_bucket: f.cv_bucket,
            velocity_trend: f.trend,
            sample_size: f.sample_size,
            delay_probability: self.assessment.delay_probability,
            risk_level: self.assessment.risk_level,
            actionable_suggestions: self.suggestions.clone(),
        }
    }
}

/// Writes one prediction plus its alert transitions per cycle.
#[derive(Clone)]
pub struct PredictionStore {
    storage: Arc<dyn Storage>,
}

impl PredictionStore {
    /// Create a store over a storage backend.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Persist the outcome and transitions as one atomic unit.
    ///
    /// On error nothing has been written.
    pub async fn persist(
        &self,
        outcome: &CycleOutcome,
        transitions: Vec<AlertTransition>,
    ) -> Result<BurndownPrediction> {
        let prediction = outcome.to_prediction();
        let commit = CycleCommit {
            prediction,
            transitions,
        };

        self.storage.commit_cycle(&commit).await?;

        info!(
            board = %commit.prediction.board_id,
            prediction = %commit.prediction.id,
            risk = commit.prediction.risk_level.as_str(),
            "Persisted prediction with {} alert transition(s)",
            commit.transitions.len()
        );
        Ok(commit.prediction)
    }
}
