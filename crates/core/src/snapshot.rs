//! Velocity snapshot model - one closed period of throughput.

use serde::{Deserialize, Serialize};
use crate::id::BoardId;
use crate::Time;

/// Throughput measured over one fixed, closed period.
///
/// Identified by `(board_id, period_start)`; recomputing a period replaces
/// the stored snapshot instead of appending a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocitySnapshot {
    /// Board the snapshot belongs to
    pub board_id: BoardId,

    /// Inclusive period start
    pub period_start: Time,

    /// Exclusive period end
    pub period_end: Time,

    /// Tasks completed in the period
    pub tasks_completed: u32,

    /// Story points completed in the period
    pub story_points_completed: f64,

    /// Distinct members who completed at least one task
    pub active_team_members: Option<u32>,

    /// 100 minus the reopened percentage, if anything was completed
    pub quality_score: Option<f64>,
}

impl VelocitySnapshot {
    /// Length of the period.
    pub fn period_length(&self) -> chrono::Duration {
        self.period_end - self.period_start
    }

    /// Velocity measured in the given basis.
    pub fn velocity(&self, basis: VelocityBasis) -> f64 {
        match basis {
            VelocityBasis::Tasks => self.tasks_completed as f64,
            VelocityBasis::StoryPoints => self.story_points_completed,
        }
    }
}

/// Unit of work used for velocity and remaining work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityBasis {
    /// Count of tasks
    #[default]
    Tasks,
    /// Sum of story points
    StoryPoints,
}

impl VelocityBasis {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityBasis::Tasks => "tasks",
            VelocityBasis::StoryPoints => "story_points",
        }
    }
}
