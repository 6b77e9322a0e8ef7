//! Board activity consumed by the engine.
//!
//! These records are owned by the task/board collaborator; the engine only
//! reads them.

use serde::{Deserialize, Serialize};
use crate::id::{MemberId, TaskRef};
use crate::Time;

/// A task that reached the done state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    /// Task that was completed
    pub task: TaskRef,

    /// When it was completed
    pub completed_at: Time,

    /// Story-point estimate (0 when unestimated)
    #[serde(default)]
    pub story_points: f64,

    /// Who completed it
    #[serde(default)]
    pub completed_by: Option<MemberId>,
}

/// A previously completed task that was reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReopening {
    /// Task that was reopened
    pub task: TaskRef,

    /// When it was reopened
    pub reopened_at: Time,
}

/// A task that is not yet done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTask {
    /// Task reference
    pub task: TaskRef,

    /// Story-point estimate (0 when unestimated)
    #[serde(default)]
    pub story_points: f64,
}

/// Sprint milestone owned by the board collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintMilestone {
    /// Milestone name
    pub name: String,

    /// Target date
    pub target_date: Time,

    /// Whether the milestone has been reached
    #[serde(default)]
    pub completed: bool,
}

impl SprintMilestone {
    /// Earliest incomplete milestone, used as an implicit forecast target.
    pub fn next_target(milestones: &[SprintMilestone]) -> Option<&SprintMilestone> {
        milestones
            .iter()
            .filter(|m| !m.completed)
            .min_by_key(|m| m.target_date)
    }
}

/// Completion and reopen history for a board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardActivity {
    /// Completed tasks
    #[serde(default)]
    pub completions: Vec<TaskCompletion>,

    /// Reopen events
    #[serde(default)]
    pub reopenings: Vec<TaskReopening>,
}
