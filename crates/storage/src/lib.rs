//! Storage abstraction and implementations for burndown forecasts.
//!
//! This crate provides a trait-based storage interface for velocity
//! snapshots, predictions and alerts, with a JSON file backend and a
//! SQLite backend.

#![warn(missing_docs)]

pub mod trait_;
#[cfg(feature = "json")]
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

#[cfg(test)]
mod fixtures;

pub use trait_::{apply_transitions, check_open_alerts, CycleCommit, Result, Storage, StorageError};
#[cfg(feature = "json")]
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
