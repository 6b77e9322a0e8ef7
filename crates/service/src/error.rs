//! Service error type.

use burndown_core::{ForecastError, InvalidTransition};
use burndown_storage::StorageError;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by the forecasting service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad input or not enough history
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    /// The atomic commit (or another storage call) failed; nothing was written
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    /// Alert lifecycle violation
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Board data could not be read
    #[error("Board source error: {0}")]
    Source(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Whether the error means "not enough history yet" rather than a failure.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, ServiceError::Forecast(e) if e.is_insufficient_data())
    }
}
