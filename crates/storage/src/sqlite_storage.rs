//! SQLite storage backend.
//!
//! Records are stored as JSON documents next to the columns needed for
//! ordering and constraints. A partial unique index on open alerts makes
//! the one-open-alert-per-type rule a database constraint, and
//! [`Storage::commit_cycle`] runs inside a single transaction.

use std::path::Path;

use async_trait::async_trait;
use burndown_core::{
    AlertId, AlertTransition, BoardId, BurndownAlert, BurndownPrediction, VelocitySnapshot,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use super::trait_::{sort_key, CycleCommit, Result, Storage, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS snapshots (
                board_id TEXT NOT NULL,
                period_start INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (board_id, period_start)
            )",
            "CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                board_id TEXT NOT NULL,
                generated_at INTEGER NOT NULL,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_predictions_board
                ON predictions(board_id, generated_at)",
            "CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                board_id TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                data TEXT NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_open
                ON alerts(board_id, alert_type) WHERE status != 'resolved'",
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }

        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    // === Snapshot operations ===

    async fn save_snapshot(&self, snapshot: &VelocitySnapshot) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;

        sqlx::query(
            "INSERT OR REPLACE INTO snapshots (board_id, period_start, data) VALUES (?, ?, ?)",
        )
        .bind(snapshot.board_id.as_str())
        .bind(sort_key(snapshot.period_start))
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn list_snapshots(&self, board_id: &BoardId) -> Result<Vec<VelocitySnapshot>> {
        let rows = sqlx::query("SELECT data FROM snapshots WHERE board_id = ? ORDER BY period_start")
            .bind(board_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(decode).collect()
    }

    // === Prediction operations ===

    async fn load_latest_prediction(&self, board_id: &BoardId) -> Result<Option<BurndownPrediction>> {
        let row = sqlx::query(
            "SELECT data FROM predictions WHERE board_id = ?
            ORDER BY generated_at DESC, rowid DESC LIMIT 1",
        )
        .bind(board_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(decode).transpose()
    }

    async fn list_predictions(&self, board_id: &BoardId) -> Result<Vec<BurndownPrediction>> {
        let rows = sqlx::query(
            "SELECT data FROM predictions WHERE board_id = ? ORDER BY generated_at, rowid",
        )
        .bind(board_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(decode).collect()
    }

    // === Alert operations ===

    async fn load_alert(&self, board_id: &BoardId, id: AlertId) -> Result<Option<BurndownAlert>> {
        let row = sqlx::query("SELECT data FROM alerts WHERE id = ? AND board_id = ?")
            .bind(id.to_string())
            .bind(board_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(decode).transpose()
    }

    async fn list_alerts(&self, board_id: &BoardId) -> Result<Vec<BurndownAlert>> {
        let rows = sqlx::query("SELECT data FROM alerts WHERE board_id = ? ORDER BY created_at, id")
            .bind(board_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(decode).collect()
    }

    async fn list_open_alerts(&self, board_id: &BoardId) -> Result<Vec<BurndownAlert>> {
        let rows = sqlx::query(
            "SELECT data FROM alerts WHERE board_id = ? AND status != 'resolved'
            ORDER BY created_at, id",
        )
        .bind(board_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(decode).collect()
    }

    async fn update_alert(&self, alert: &BurndownAlert) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        update_alert_row(&mut conn, alert).await
    }

    // === Transaction support ===

    async fn commit_cycle(&self, commit: &CycleCommit) -> Result<()> {
        commit.validate()?;
        let prediction = &commit.prediction;

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("INSERT INTO predictions (id, board_id, generated_at, data) VALUES (?, ?, ?, ?)")
            .bind(prediction.id.to_string())
            .bind(prediction.board_id.as_str())
            .bind(sort_key(prediction.generated_at))
            .bind(serde_json::to_string(prediction)?)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        // Resolutions first so a replacement alert never trips the open-alert index
        let mut transitions: Vec<&AlertTransition> = commit.transitions.iter().collect();
        transitions.sort_by_key(|t| match t {
            AlertTransition::AutoResolved(_) => 0,
            AlertTransition::Updated(_) => 1,
            AlertTransition::Created(_) => 2,
        });

        for transition in transitions {
            match transition {
                AlertTransition::Created(alert) => insert_alert_row(&mut tx, alert).await?,
                AlertTransition::Updated(alert) | AlertTransition::AutoResolved(alert) => {
                    update_alert_row(&mut tx, alert).await?
                }
            }
        }

        // Dropping `tx` on any early return above rolls everything back
        tx.commit().await.map_err(db_error)?;

        debug!(
            board = %prediction.board_id,
            prediction = %prediction.id,
            transitions = commit.transitions.len(),
            "generation cycle committed"
        );
        Ok(())
    }
}

async fn insert_alert_row(conn: &mut sqlx::SqliteConnection, alert: &BurndownAlert) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO alerts (id, board_id, alert_type, status, created_at, data)
        VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(alert.id.to_string())
    .bind(alert.board_id.as_str())
    .bind(alert.alert_type.as_str())
    .bind(alert.status.as_str())
    .bind(sort_key(alert.created_at))
    .bind(serde_json::to_string(alert)?)
    .execute(conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            warn!(board = %alert.board_id, alert_type = %alert.alert_type, "duplicate open alert rejected");
            Err(StorageError::Conflict(format!(
                "board {} already has an open {} alert",
                alert.board_id, alert.alert_type
            )))
        }
        Err(e) => Err(db_error(e)),
    }
}

async fn update_alert_row(conn: &mut sqlx::SqliteConnection, alert: &BurndownAlert) -> Result<()> {
    let result = sqlx::query("UPDATE alerts SET status = ?, data = ? WHERE id = ? AND board_id = ?")
        .bind(alert.status.as_str())
        .bind(serde_json::to_string(alert)?)
        .bind(alert.id.to_string())
        .bind(alert.board_id.as_str())
        .execute(conn)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            Err(StorageError::NotFound(format!("alert {}", alert.id)))
        }
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StorageError::Conflict(
            format!("board {} already has an open {} alert", alert.board_id, alert.alert_type),
        )),
        Err(e) => Err(db_error(e)),
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> Result<T> {
    let data: String = row.try_get("data").map_err(db_error)?;
    Ok(serde_json::from_str(&data)?)
}

fn db_error(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}
