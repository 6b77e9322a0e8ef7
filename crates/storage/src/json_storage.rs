//! JSON file storage implementation.
//!
//! Layout under the storage root:
//!
//! ```text
//! boards/<board>/snapshots/<period_start_ms>.json
//! boards/<board>/forecast.json
//! ```
//!
//! `forecast.json` holds a board's predictions and alerts together so that a
//! generation cycle is committed with a single atomic rename. It also carries
//! a meta marker (version + updated_at) bumped on every write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use burndown_core::{AlertId, BoardId, BurndownAlert, BurndownPrediction, Time, VelocitySnapshot};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::trait_::{apply_transitions, check_open_alerts, sort_key, CycleCommit, Storage, StorageError, Result};

/// Per-board predictions and alerts.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BoardState {
    version: u64,
    updated_at: Option<Time>,
    #[serde(default)]
    predictions: Vec<BurndownPrediction>,
    #[serde(default)]
    alerts: Vec<BurndownAlert>,
}

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("boards")).await?;

        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn board_dir(&self, board_id: &BoardId) -> PathBuf {
        self.root.join("boards").join(dir_name(board_id))
    }

    fn snapshot_dir(&self, board_id: &BoardId) -> PathBuf {
        self.board_dir(board_id).join("snapshots")
    }

    fn state_path(&self, board_id: &BoardId) -> PathBuf {
        self.board_dir(board_id).join("forecast.json")
    }

    async fn load_state(&self, board_id: &BoardId) -> Result<BoardState> {
        let mut state: BoardState = read_json(&self.state_path(board_id)).await?.unwrap_or_default();
        state.predictions.retain(|p| &p.board_id == board_id);
        state.alerts.retain(|a| &a.board_id == board_id);
        Ok(state)
    }

    /// Write the state file through a temp file so readers never see a partial write.
    async fn store_state(&self, board_id: &BoardId, mut state: BoardState) -> Result<()> {
        check_open_alerts(&state.alerts)?;

        state.version += 1;
        state.updated_at = Some(chrono::Utc::now());

        let path = self.state_path(board_id);
        fs::create_dir_all(self.board_dir(board_id)).await?;
        write_atomic(&path, &serde_json::to_vec_pretty(&state)?).await?;

        debug!(board = %board_id, version = state.version, "board state written");
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn save_snapshot(&self, snapshot: &VelocitySnapshot) -> Result<()> {
        let dir = self.snapshot_dir(&snapshot.board_id);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.json", sort_key(snapshot.period_start)));
        let _guard = self.write_lock.lock().await;
        write_atomic(&path, &serde_json::to_vec_pretty(snapshot)?).await
    }

    async fn list_snapshots(&self, board_id: &BoardId) -> Result<Vec<VelocitySnapshot>> {
        let mut snapshots: Vec<VelocitySnapshot> = list_dir(&self.snapshot_dir(board_id)).await?;
        snapshots.retain(|s| &s.board_id == board_id);
        snapshots.sort_by_key(|s| s.period_start);
        Ok(snapshots)
    }

    async fn load_latest_prediction(&self, board_id: &BoardId) -> Result<Option<BurndownPrediction>> {
        Ok(self.load_state(board_id).await?.predictions.pop())
    }

    async fn list_predictions(&self, board_id: &BoardId) -> Result<Vec<BurndownPrediction>> {
        Ok(self.load_state(board_id).await?.predictions)
    }

    async fn load_alert(&self, board_id: &BoardId, id: AlertId) -> Result<Option<BurndownAlert>> {
        let state = self.load_state(board_id).await?;
        Ok(state.alerts.into_iter().find(|a| a.id == id))
    }

    async fn list_alerts(&self, board_id: &BoardId) -> Result<Vec<BurndownAlert>> {
        let mut alerts = self.load_state(board_id).await?.alerts;
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    async fn update_alert(&self, alert: &BurndownAlert) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load_state(&alert.board_id).await?;

        let slot = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or_else(|| StorageError::NotFound(format!("alert {}", alert.id)))?;
        *slot = alert.clone();

        self.store_state(&alert.board_id, state).await
    }

    async fn commit_cycle(&self, commit: &CycleCommit) -> Result<()> {
        commit.validate()?;
        let board_id = commit.board_id();

        let _guard = self.write_lock.lock().await;
        let mut state = self.load_state(board_id).await?;

        apply_transitions(&mut state.alerts, &commit.transitions)?;
        state.predictions.push(commit.prediction.clone());

        self.store_state(board_id, state).await
    }
}

/// Directory name for a board: the hex-encoded id, one directory per distinct id.
fn dir_name(board_id: &BoardId) -> String {
    hex::encode(board_id.as_str())
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(items),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&entry.path()).await? {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{alert, prediction, prediction_at, snapshot, start};
    use burndown_core::{AlertStatus, AlertTransition, AlertType};
    use chrono::Duration;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, JsonStorage) {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_snapshot_replace_by_period() {
        let (_dir, storage) = storage().await;
        let board = BoardId::new("team/alpha");

        storage.save_snapshot(&snapshot(&board, 1, 9)).await.unwrap();
        storage.save_snapshot(&snapshot(&board, 0, 8)).await.unwrap();
        storage.save_snapshot(&snapshot(&board, 1, 12)).await.unwrap();

        let snaps = storage.list_snapshots(&board).await.unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].tasks_completed, 8);
        assert_eq!(snaps[1].tasks_completed, 12);
    }

    #[tokio::test]
    async fn test_unknown_board_is_empty() {
        let (_dir, storage) = storage().await;
        let board = BoardId::new("nobody");

        assert!(storage.list_snapshots(&board).await.unwrap().is_empty());
        assert!(storage.load_latest_prediction(&board).await.unwrap().is_none());
        assert!(storage.list_alerts(&board).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_cycle_persists_prediction_and_alerts() {
        let (dir, storage) = storage().await;
        let board = BoardId::new("b");

        let first = prediction_at(&board, start());
        let a = alert(&board, AlertType::Stagnation);
        storage
            .commit_cycle(&CycleCommit {
                prediction: first.clone(),
                transitions: vec![AlertTransition::Created(a.clone())],
            })
            .await
            .unwrap();

        let second = prediction_at(&board, start() + Duration::days(1));
        storage
            .commit_cycle(&CycleCommit {
                prediction: second.clone(),
                transitions: Vec::new(),
            })
            .await
            .unwrap();

        // Reopen from disk
        let reopened = JsonStorage::new(dir.path()).await.unwrap();
        let latest = reopened.load_latest_prediction(&board).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(reopened.list_predictions(&board).await.unwrap().len(), 2);
        assert_eq!(reopened.load_alert(&board, a.id).await.unwrap(), Some(a));
        assert_eq!(reopened.list_open_alerts(&board).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let (_dir, storage) = storage().await;
        let board = BoardId::new("b");

        storage
            .commit_cycle(&CycleCommit {
                prediction: prediction_at(&board, start()),
                transitions: vec![AlertTransition::Created(alert(&board, AlertType::ScopeCreep))],
            })
            .await
            .unwrap();

        let result = storage
            .commit_cycle(&CycleCommit {
                prediction: prediction(&board),
                transitions: vec![AlertTransition::Created(alert(&board, AlertType::ScopeCreep))],
            })
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        assert_eq!(storage.list_predictions(&board).await.unwrap().len(), 1);
        assert_eq!(storage.list_alerts(&board).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_alert() {
        let (_dir, storage) = storage().await;
        let board = BoardId::new("b");
        let mut a = alert(&board, AlertType::VelocityDrop);

        assert!(matches!(
            storage.update_alert(&a).await,
            Err(StorageError::NotFound(_))
        ));

        storage
            .commit_cycle(&CycleCommit {
                prediction: prediction(&board),
                transitions: vec![AlertTransition::Created(a.clone())],
            })
            .await
            .unwrap();

        a.acknowledge(start() + Duration::weeks(9)).unwrap();
        storage.update_alert(&a).await.unwrap();

        let loaded = storage.load_alert(&board, a.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, AlertStatus::Acknowledged);
        assert!(loaded.status.is_open());
    }

    #[test]
    fn test_dir_name_is_injective_and_path_safe() {
        assert_ne!(dir_name(&BoardId::new("team.alpha")), dir_name(&BoardId::new("team_alpha")));
        assert_ne!(dir_name(&BoardId::new("a/b")), dir_name(&BoardId::new("a_b")));
        assert_eq!(dir_name(&BoardId::new("web")), "776562");
        assert!(dir_name(&BoardId::new("../x y")).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_similar_board_ids_stay_isolated() {
        let (_dir, storage) = storage().await;
        let dotted = BoardId::new("team.alpha");
        let underscored = BoardId::new("team_alpha");

        storage.save_snapshot(&snapshot(&dotted, 0, 8)).await.unwrap();
        storage
            .commit_cycle(&CycleCommit {
                prediction: prediction(&dotted),
                transitions: vec![AlertTransition::Created(alert(&dotted, AlertType::Stagnation))],
            })
            .await
            .unwrap();

        assert!(storage.list_snapshots(&underscored).await.unwrap().is_empty());
        assert!(storage.load_latest_prediction(&underscored).await.unwrap().is_none());
        assert!(storage.list_predictions(&underscored).await.unwrap().is_empty());
        assert!(storage.list_alerts(&underscored).await.unwrap().is_empty());

        // The second board can raise its own alert of the same type
        storage
            .commit_cycle(&CycleCommit {
                prediction: prediction(&underscored),
                transitions: vec![AlertTransition::Created(alert(&underscored, AlertType::Stagnation))],
            })
            .await
            .unwrap();
        assert_eq!(storage.list_open_alerts(&dotted).await.unwrap().len(), 1);
        assert_eq!(storage.list_open_alerts(&underscored).await.unwrap().len(), 1);
        assert_eq!(storage.list_snapshots(&dotted).await.unwrap().len(), 1);
    }
}
