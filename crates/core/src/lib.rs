//! Burndown core data models.
//!
//! This crate defines the data structures shared by the forecasting
//! engine: velocity snapshots, predictions, alerts and the board activity
//! they are derived from.

#![warn(missing_docs)]

// Core identities
mod id;

// Board input
mod activity;

// Forecast records
mod snapshot;
mod prediction;
mod alert;

mod error;

// Re-exports
pub use id::*;

pub use activity::{BoardActivity, OpenTask, SprintMilestone, TaskCompletion, TaskReopening};
pub use snapshot::{VelocityBasis, VelocitySnapshot};
pub use prediction::{
    BurndownPrediction, ConfidenceLevel, CvBucket, Magnitude, RiskLevel, Suggestion,
    SuggestionType, VelocityTrend,
};
pub use alert::{
    AlertSeverity, AlertStatus, AlertTransition, AlertType, BurndownAlert, InvalidTransition,
};
pub use error::{ForecastError, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
