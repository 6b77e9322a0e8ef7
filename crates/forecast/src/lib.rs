//! Burndown forecasting engine.
//!
//! Pure computation stages of a generation cycle: snapshot collection,
//! statistical forecasting, risk assessment, alert decisions, and
//! suggestions. None of these perform I/O.

#![warn(missing_docs)]

pub mod collector;
pub mod forecaster;
pub mod risk;
pub mod alerts;
pub mod suggestions;

#[cfg(test)]
mod test_support;

pub use collector::VelocitySnapshotCollector;
pub use forecaster::{ForecastResult, ForecasterConfig, StatisticalForecaster, MIN_SNAPSHOTS};
pub use risk::{standard_normal_cdf, RiskAssessment, RiskAssessor};
pub use alerts::{
    AlertConfig, AlertManager, Detection, DetectionContext, DEFAULT_SCOPE_CREEP_THRESHOLD,
};
pub use suggestions::{SuggestionEngine, SuggestionInput, SuggestionRule, RULES};
