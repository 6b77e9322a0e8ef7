//! Velocity snapshot collection.
//!
//! Aggregates raw completion and reopen events into one
//! [`VelocitySnapshot`] per closed period. Everything here is a pure
//! function of its inputs so that recomputing a period is bit-identical.

use std::collections::BTreeSet;

use burndown_core::{
    BoardActivity, BoardId, ForecastError, Result, TaskCompletion, Time, VelocitySnapshot,
};
use chrono::Duration;

/// Builds velocity snapshots from board activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocitySnapshotCollector;

impl VelocitySnapshotCollector {
    /// Create a new collector.
    pub fn new() -> Self {
        Self
    }

    /// Compute the snapshot for `[period_start, period_end)`.
    pub fn compute_snapshot(
        &self,
        board_id: &BoardId,
        period_start: Time,
        period_end: Time,
        activity: &BoardActivity,
    ) -> Result<VelocitySnapshot> {
        if period_end <= period_start {
            return Err(ForecastError::validation(format!(
                "period_end ({}) must be after period_start ({})",
                period_end, period_start
            )));
        }

        let in_period = |t: &Time| *t >= period_start && *t < period_end;

        let mut completed: Vec<&TaskCompletion> = activity
            .completions
            .iter()
            .filter(|c| in_period(&c.completed_at))
            .collect();
        // Fixed summation order keeps the float sum stable across input orderings
        completed.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.task.cmp(&b.task))
        });

        let tasks_completed = completed.len() as u32;
        let story_points_completed: f64 = completed
            .iter()
            .map(|c| c.story_points.max(0.0))
            .sum();

        let members: BTreeSet<_> = completed
            .iter()
            .filter_map(|c| c.completed_by.as_ref())
            .collect();
        let active_team_members = match members.len() {
            0 => None,
            n => Some(n as u32),
        };

        let reopened: BTreeSet<_> = activity
            .reopenings
            .iter()
            .filter(|r| in_period(&r.reopened_at))
            .map(|r| &r.task)
            .collect();

        let quality_score = if tasks_completed == 0 {
            None
        } else {
            let reopened_pct = reopened.len() as f64 / tasks_completed as f64 * 100.0;
            Some((100.0 - reopened_pct).clamp(0.0, 100.0))
        };

        Ok(VelocitySnapshot {
            board_id: board_id.clone(),
            period_start,
            period_end,
            tasks_completed,
            story_points_completed,
            active_team_members,
            quality_score,
        })
    }

    /// Compute snapshots for every consecutive period starting at
    /// `first_period_start` that closes at or before `until`.
    pub fn backfill(
        &self,
        board_id: &BoardId,
        first_period_start: Time,
        period_length: Duration,
        until: Time,
        activity: &BoardActivity,
    ) -> Result<Vec<VelocitySnapshot>> {
        if period_length <= Duration::zero() {
            return Err(ForecastError::validation("period length must be positive"));
        }

        let mut snapshots = Vec::new();
        let mut start = first_period_start;
        while start + period_length <= until {
            let end = start + period_length;
            snapshots.push(self.compute_snapshot(board_id, start, end, activity)?);
            start = end;
        }

        Ok(snapshots)
    }
}
