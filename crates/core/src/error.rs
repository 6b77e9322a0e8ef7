//! Errors raised by the pure forecasting stages.

/// Result alias for forecasting computations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors raised before or during forecast computation.
///
/// None of these are retried: the same input always fails the same way.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    /// Input rejected before computation (bad period bounds, confidence level, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not enough history to produce a forecast
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

impl ForecastError {
    /// Build a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an insufficient-data error.
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    /// Whether this error means "not enough data yet".
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData(_))
    }
}
