//! Board data consumed by the engine.

use std::path::Path;

use async_trait::async_trait;
use burndown_core::{
    BoardActivity, BoardId, OpenTask, SprintMilestone, TaskCompletion, TaskReopening,
    VelocityBasis,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Read-only view of the task/board system.
#[async_trait]
pub trait BoardSource: Send + Sync {
    /// Completion and reopen history.
    async fn activity(&self, board_id: &BoardId) -> Result<BoardActivity>;

    /// Tasks not yet done.
    async fn open_tasks(&self, board_id: &BoardId) -> Result<Vec<OpenTask>>;

    /// Sprint milestones.
    async fn milestones(&self, board_id: &BoardId) -> Result<Vec<SprintMilestone>>;
}

/// Remaining work in the unit of `basis`.
pub fn remaining_work(open_tasks: &[OpenTask], basis: VelocityBasis) -> f64 {
    match basis {
        VelocityBasis::Tasks => open_tasks.len() as f64,
        VelocityBasis::StoryPoints => open_tasks.iter().map(|t| t.story_points.max(0.0)).sum(),
    }
}

/// A JSON export of one board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardExport {
    /// Exported board
    pub board_id: BoardId,

    /// Completed tasks
    #[serde(default)]
    pub completions: Vec<TaskCompletion>,

    /// Reopen events
    #[serde(default)]
    pub reopenings: Vec<TaskReopening>,

    /// Tasks not yet done
    #[serde(default)]
    pub open_tasks: Vec<OpenTask>,

    /// Sprint milestones
    #[serde(default)]
    pub milestones: Vec<SprintMilestone>,
}

impl BoardExport {
    /// An export with no tasks, for operations that only touch stored records.
    pub fn empty(board_id: BoardId) -> Self {
        Self {
            board_id,
            completions: Vec::new(),
            reopenings: Vec::new(),
            open_tasks: Vec::new(),
            milestones: Vec::new(),
        }
    }

    /// Read an export from a JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServiceError::Source(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| ServiceError::Source(format!("{}: {}", path.display(), e)))
    }

    fn check_board(&self, board_id: &BoardId) -> Result<()> {
        if &self.board_id != board_id {
            return Err(ServiceError::NotFound(format!("board {}", board_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl BoardSource for BoardExport {
    async fn activity(&self, board_id: &BoardId) -> Result<BoardActivity> {
        self.check_board(board_id)?;
        Ok(BoardActivity {
            completions: self.completions.clone(),
            reopenings: self.reopenings.clone(),
        })
    }

    async fn open_tasks(&self, board_id: &BoardId) -> Result<Vec<OpenTask>> {
        self.check_board(board_id)?;
        Ok(self.open_tasks.clone())
    }

    async fn milestones(&self, board_id: &BoardId) -> Result<Vec<SprintMilestone>> {
        self.check_board(board_id)?;
        Ok(self.milestones.clone())
    }
}
