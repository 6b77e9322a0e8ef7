//! Engine configuration.

use std::path::{Path, PathBuf};

use burndown_core::{ConfidenceLevel, ForecastError, VelocityBasis};
use burndown_forecast::{AlertConfig, DEFAULT_SCOPE_CREEP_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Default snapshot period, in days.
pub const DEFAULT_PERIOD_DAYS: i64 = 7;

/// Where forecast records are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// JSON files under a directory
    Json {
        /// Storage root
        path: PathBuf,
    },
    /// A SQLite database file
    Sqlite {
        /// Database file
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Json {
            path: PathBuf::from(".burndown"),
        }
    }
}

/// Forecasting engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence level used when a request does not name one
    pub confidence_level: ConfidenceLevel,

    /// Velocity and remaining-work unit
    pub basis: VelocityBasis,

    /// Alert detection settings
    pub alerts: AlertConfig,

    /// Snapshot period length in days
    pub period_days: i64,

    /// Storage backend
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_level: ConfidenceLevel::default(),
            basis: VelocityBasis::default(),
            alerts: AlertConfig::default(),
            period_days: DEFAULT_PERIOD_DAYS,
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(raw).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.alerts.scope_creep_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ForecastError::validation(format!(
                "scope_creep_threshold must be a positive number (got {})",
                threshold
            ))
            .into());
        }
        if self.period_days <= 0 {
            return Err(ForecastError::validation(format!(
                "period_days must be positive (got {})",
                self.period_days
            ))
            .into());
        }
        Ok(())
    }

    /// Snapshot period length.
    pub fn period_length(&self) -> chrono::Duration {
        chrono::Duration::days(self.period_days)
    }

    /// Set the default confidence level.
    pub fn with_confidence_level(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = level;
        self
    }

    /// Set the velocity basis.
    pub fn with_basis(mut self, basis: VelocityBasis) -> Self {
        self.basis = basis;
        self
    }

    /// Set the scope creep threshold.
    pub fn with_scope_creep_threshold(mut self, threshold: f64) -> Self {
        self.alerts.scope_creep_threshold = threshold;
        self
    }

    /// Set the storage backend.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.confidence_level, ConfidenceLevel::P90);
        assert_eq!(config.basis, VelocityBasis::Tasks);
        assert_eq!(config.alerts.scope_creep_threshold, DEFAULT_SCOPE_CREEP_THRESHOLD);
        assert_eq!(config.period_length(), chrono::Duration::days(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "confidence_level": 95, "storage": { "backend": "sqlite", "path": "bd.db" } }"#,
        )
        .unwrap();

        assert_eq!(config.confidence_level, ConfidenceLevel::P95);
        assert_eq!(config.basis, VelocityBasis::Tasks);
        assert_eq!(
            config.storage,
            StorageConfig::Sqlite {
                path: PathBuf::from("bd.db")
            }
        );
    }

    #[test]
    fn test_story_points_basis() {
        let config = EngineConfig::from_json(r#"{ "basis": "story_points" }"#).unwrap();
        assert_eq!(config.basis, VelocityBasis::StoryPoints);
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let err = EngineConfig::from_json(r#"{ "confidence_level": 80 }"#).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = EngineConfig::from_json(r#"{ "alerts": { "scope_creep_threshold": -0.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forecast(ForecastError::Validation(_))));

        let zero_period = EngineConfig::default().with_scope_creep_threshold(0.2);
        let zero_period = EngineConfig {
            period_days: 0,
            ..zero_period
        };
        assert!(zero_period.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("burndown.json");
        std::fs::write(&path, r#"{ "period_days": 14 }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.period_days, 14);

        let missing = EngineConfig::from_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ServiceError::Config(_))));
    }
}
