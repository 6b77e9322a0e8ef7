//! Storage trait abstraction.

use async_trait::async_trait;
use burndown_core::{
    AlertId, AlertTransition, AlertType, BoardId, BurndownAlert, BurndownPrediction, Time,
    VelocitySnapshot,
};
use std::collections::HashSet;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The write would break a store invariant; nothing was written
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Everything one generation cycle writes, committed as a unit.
#[derive(Debug, Clone)]
pub struct CycleCommit {
    /// The new prediction
    pub prediction: BurndownPrediction,

    /// Alert changes computed against the open alerts read under the board lock
    pub transitions: Vec<AlertTransition>,
}

impl CycleCommit {
    /// Board the commit applies to.
    pub fn board_id(&self) -> &BoardId {
        &self.prediction.board_id
    }

    /// Reject commits whose parts disagree about the board.
    pub fn validate(&self) -> Result<()> {
        let board = self.board_id();
        if let Some(t) = self.transitions.iter().find(|t| &t.alert().board_id != board) {
            return Err(StorageError::Conflict(format!(
                "alert {} belongs to board {}, not {}",
                t.alert().id,
                t.alert().board_id,
                board
            )));
        }
        Ok(())
    }
}

/// Storage abstraction for forecast records.
///
/// Implementations must make [`Storage::commit_cycle`] all-or-nothing and
/// must never hold two open alerts of the same type for one board.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Snapshot operations ===

    /// Save a snapshot, replacing any existing one for the same board and period start.
    async fn save_snapshot(&self, snapshot: &VelocitySnapshot) -> Result<()>;

    /// List a board's snapshots ordered by period start.
    async fn list_snapshots(&self, board_id: &BoardId) -> Result<Vec<VelocitySnapshot>>;

    // === Prediction operations ===

    /// Most recently generated prediction for a board.
    async fn load_latest_prediction(&self, board_id: &BoardId) -> Result<Option<BurndownPrediction>>;

    /// List a board's predictions in generation order.
    async fn list_predictions(&self, board_id: &BoardId) -> Result<Vec<BurndownPrediction>>;

    // === Alert operations ===

    /// Load an alert by ID.
    async fn load_alert(&self, board_id: &BoardId, id: AlertId) -> Result<Option<BurndownAlert>>;

    /// List a board's alerts ordered by creation time.
    async fn list_alerts(&self, board_id: &BoardId) -> Result<Vec<BurndownAlert>>;

    /// List a board's active and acknowledged alerts.
    async fn list_open_alerts(&self, board_id: &BoardId) -> Result<Vec<BurndownAlert>> {
        Ok(self
            .list_alerts(board_id)
            .await?
            .into_iter()
            .filter(|a| a.status.is_open())
            .collect())
    }

    /// Overwrite an existing alert, e.g. after a user acknowledges it.
    async fn update_alert(&self, alert: &BurndownAlert) -> Result<()>;

    // === Transaction support ===

    /// Persist a prediction and its alert transitions atomically.
    async fn commit_cycle(&self, commit: &CycleCommit) -> Result<()>;
}

/// Apply alert transitions to an in-memory alert list.
///
/// Fails without touching `alerts` if a transition references an unknown
/// alert, re-creates an existing one, or leaves two open alerts of one type.
pub fn apply_transitions(
    alerts: &mut Vec<BurndownAlert>,
    transitions: &[AlertTransition],
) -> Result<()> {
    let mut next = alerts.clone();
    for transition in transitions {
        let alert = transition.alert();
        let existing = next.iter().position(|a| a.id == alert.id);
        match (transition, existing) {
            (AlertTransition::Created(_), None) => next.push(alert.clone()),
            (AlertTransition::Created(_), Some(_)) => {
                return Err(StorageError::Conflict(format!("alert {} already exists", alert.id)));
            }
            (_, Some(i)) => next[i] = alert.clone(),
            (_, None) => return Err(StorageError::NotFound(format!("alert {}", alert.id))),
        }
    }

    check_open_alerts(&next)?;
    *alerts = next;
    Ok(())
}

/// At most one open alert per (board, type).
pub fn check_open_alerts(alerts: &[BurndownAlert]) -> Result<()> {
    let mut seen: HashSet<(&BoardId, AlertType)> = HashSet::new();
    for alert in alerts.iter().filter(|a| a.status.is_open()) {
        if !seen.insert((&alert.board_id, alert.alert_type)) {
            return Err(StorageError::Conflict(format!(
                "board {} already has an open {} alert",
                alert.board_id, alert.alert_type
            )));
        }
    }
    Ok(())
}

/// Milliseconds since the epoch, used as a sortable key.
pub(crate) fn sort_key(t: Time) -> i64 {
    t.timestamp_millis()
}
