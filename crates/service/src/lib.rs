//! Burndown forecasting service.
//!
//! Ties the pure forecasting components to storage and to the board
//! system: each generation cycle reads snapshots, forecasts, assesses risk,
//! ranks suggestions, and then commits the prediction and alert changes
//! atomically under a per-board lock.

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod notifier;
pub mod source;
pub mod store;

pub use config::{EngineConfig, StorageConfig, DEFAULT_PERIOD_DAYS};
pub use engine::{ForecastService, GenerateRequest};
pub use error::{Result, ServiceError};
pub use locks::BoardLocks;
pub use notifier::{AlertEvent, AlertEventKind, AlertNotifier, ChannelNotifier, TracingNotifier};
pub use source::{remaining_work, BoardExport, BoardSource};
pub use store::{CycleOutcome, PredictionStore};
