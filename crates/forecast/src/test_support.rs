//! Shared fixtures for unit tests.

use burndown_core::{BoardId, Time, VelocitySnapshot};
use chrono::{Duration, TimeZone};

/// First period start used by fixtures.
pub fn series_start() -> Time {
    chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Weekly snapshots with the given task counts (two points per task).
pub fn weekly(tasks: &[u32]) -> Vec<VelocitySnapshot> {
    let start = series_start();
    tasks
        .iter()
        .enumerate()
        .map(|(i, &t)| VelocitySnapshot {
            board_id: BoardId::new("b"),
            period_start: start + Duration::weeks(i as i64),
            period_end: start + Duration::weeks(i as i64 + 1),
            tasks_completed: t,
            story_points_completed: t as f64 * 2.0,
            active_team_members: Some(3),
            quality_score: Some(100.0),
        })
        .collect()
}
