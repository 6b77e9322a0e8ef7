use burndown_core::{
    AlertSeverity, AlertType, BoardId, BurndownAlert, BurndownPrediction, ConfidenceLevel,
    CvBucket, PredictionId, RiskLevel, Time, VelocityBasis, VelocitySnapshot, VelocityTrend,
};
use chrono::{Duration, TimeZone};

pub fn start() -> Time {
    chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn snapshot(board: &BoardId, week: i64, tasks: u32) -> VelocitySnapshot {
    let period_start = start() + Duration::weeks(week);
    VelocitySnapshot {
        board_id: board.clone(),
        period_start,
        period_end: period_start + Duration::weeks(1),
        tasks_completed: tasks,
        story_points_completed: tasks as f64 * 2.0,
        active_team_members: Some(3),
        quality_score: Some(100.0),
    }
}

pub fn prediction_at(board: &BoardId, generated_at: Time) -> BurndownPrediction {
    BurndownPrediction {
        id: PredictionId::new(),
        board_id: board.clone(),
        generated_at,
        target_date: None,
        confidence_level: ConfidenceLevel::P90,
        basis: VelocityBasis::Tasks,
        remaining_work: 35.0,
        predicted_completion_date: generated_at + Duration::days(28),
        completion_date_lower_bound: generated_at + Duration::days(26),
        completion_date_upper_bound: generated_at + Duration::days(30),
        days_margin_of_error: 2.0,
        velocity_mean: 8.75,
        velocity_std_dev: 1.28,
        velocity_cv: 14.6,
        cv_bucket: CvBucket::Low,
        velocity_trend: VelocityTrend::Stable,
        sample_size: 8,
        delay_probability: None,
        risk_level: RiskLevel::Low,
        actionable_suggestions: Vec::new(),
    }
}

pub fn prediction(board: &BoardId) -> BurndownPrediction {
    prediction_at(board, start() + Duration::weeks(8))
}

pub fn alert(board: &BoardId, alert_type: AlertType) -> BurndownAlert {
    BurndownAlert::raise(
        board.clone(),
        alert_type,
        AlertSeverity::Warning,
        format!("{} detected", alert_type),
        start() + Duration::weeks(8),
    )
}
