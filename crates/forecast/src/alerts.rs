//! Anomaly detection and alert lifecycle decisions.
//!
//! This module provides:
//! - Detection rules evaluated once per generation cycle
//! - Deduplication against alerts that are still open
//! - Auto-resolution of alerts whose condition has cleared
//!
//! Decisions are returned as [`AlertTransition`]s; applying them is the
//! caller's job, so nothing here touches storage.

use burndown_core::{
    AlertSeverity, AlertTransition, AlertType, BoardId, BurndownAlert, CvBucket, RiskLevel, Time,
    VelocitySnapshot, VelocityTrend,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::forecaster::ForecastResult;
use crate::risk::RiskAssessment;

/// Default relative growth of remaining work that counts as scope creep.
pub const DEFAULT_SCOPE_CREEP_THRESHOLD: f64 = 0.15;

/// Alert detection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Relative remaining-work growth between cycles that raises scope_creep
    #[serde(default = "default_scope_creep_threshold")]
    pub scope_creep_threshold: f64,
}

fn default_scope_creep_threshold() -> f64 {
    DEFAULT_SCOPE_CREEP_THRESHOLD
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            scope_creep_threshold: DEFAULT_SCOPE_CREEP_THRESHOLD,
        }
    }
}

/// Inputs the detection rules read.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    /// Latest forecast
    pub forecast: &'a ForecastResult,
    /// Its risk assessment
    pub assessment: &'a RiskAssessment,
    /// Snapshot series the forecast was computed from
    pub snapshots: &'a [VelocitySnapshot],
    /// Remaining work recorded by the previous cycle, if any
    pub previous_remaining_work: Option<f64>,
}

/// A detection rule that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Condition detected
    pub alert_type: AlertType,
    /// Severity to raise or refresh with
    pub severity: AlertSeverity,
    /// Message for the alert
    pub message: String,
}

/// Decides which alerts to raise, refresh, and auto-resolve.
#[derive(Debug, Clone, Default)]
pub struct AlertManager {
    config: AlertConfig,
}

impl AlertManager {
    /// Create a manager with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: AlertConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every detection rule against the cycle's inputs.
    pub fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Detection> {
        AlertType::ALL
            .iter()
            .filter_map(|t| match t {
                AlertType::VelocityDrop => self.velocity_drop(ctx),
                AlertType::ScopeCreep => self.scope_creep(ctx),
                AlertType::TargetRisk => self.target_risk(ctx),
                AlertType::VarianceHigh => self.variance_high(ctx),
                AlertType::Stagnation => self.stagnation(ctx),
            })
            .collect()
    }

    /// Turn detections into transitions against the board's open alerts.
    ///
    /// `open_alerts` may contain alerts of any status or board; only open
    /// alerts of `board_id` are considered.
    pub fn reconcile(
        &self,
        board_id: &BoardId,
        detections: &[Detection],
        open_alerts: &[BurndownAlert],
        now: Time,
    ) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();

        for alert_type in AlertType::ALL {
            let mut existing = open_alerts
                .iter()
                .filter(|a| &a.board_id == board_id && a.alert_type == alert_type)
                .filter(|a| a.status.is_open());
            let detection = detections.iter().find(|d| d.alert_type == alert_type);

            match (detection, existing.next()) {
                (Some(d), Some(current)) => {
                    let mut updated = current.clone();
                    updated.refresh(d.severity, d.message.clone(), now);
                    transitions.push(AlertTransition::Updated(updated));
                }
                (Some(d), None) => {
                    transitions.push(AlertTransition::Created(BurndownAlert::raise(
                        board_id.clone(),
                        alert_type,
                        d.severity,
                        d.message.clone(),
                        now,
                    )));
                }
                (None, Some(current)) => {
                    if let Some(resolved) = resolved_copy(current, now) {
                        transitions.push(AlertTransition::AutoResolved(resolved));
                    }
                }
                (None, None) => {}
            }

            // Extra open rows for the same type are collapsed into the first one
            for duplicate in existing {
                if let Some(resolved) = resolved_copy(duplicate, now) {
                    transitions.push(AlertTransition::AutoResolved(resolved));
                }
            }
        }

        debug!(board = %board_id, count = transitions.len(), "Reconciled alert transitions");
        transitions
    }

    /// Detect and reconcile in one step.
    pub fn evaluate(
        &self,
        board_id: &BoardId,
        ctx: &DetectionContext<'_>,
        open_alerts: &[BurndownAlert],
        now: Time,
    ) -> Vec<AlertTransition> {
        let detections = self.detect(ctx);
        self.reconcile(board_id, &detections, open_alerts, now)
    }

    fn velocity_drop(&self, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let f = ctx.forecast;
        let floor = f.velocity_mean - f.velocity_std_dev;
        if f.trend != VelocityTrend::Decreasing || f.latest_velocity >= floor {
            return None;
        }
        let severity = if f.latest_velocity < f.velocity_mean - 2.0 * f.velocity_std_dev {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        Some(Detection {
            alert_type: AlertType::VelocityDrop,
            severity,
            message: format!(
                "Velocity dropped to {:.1} per period (mean {:.1}, std dev {:.1}) and is trending down",
                f.latest_velocity, f.velocity_mean, f.velocity_std_dev
            ),
        })
    }

    fn scope_creep(&self, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let previous = ctx.previous_remaining_work?;
        let current = ctx.forecast.remaining_work;
        let threshold = self.config.scope_creep_threshold;

        let growth = if previous > 0.0 {
            (current - previous) / previous
        } else if current > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        if growth <= threshold {
            return None;
        }

        let severity = if growth > threshold * 2.0 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        let message = if growth.is_finite() {
            format!(
                "Remaining work grew {:.0}% since the last forecast ({:.1} -> {:.1})",
                growth * 100.0,
                previous,
                current
            )
        } else {
            format!("Remaining work grew from none to {:.1} since the last forecast", current)
        };
        Some(Detection {
            alert_type: AlertType::ScopeCreep,
            severity,
            message,
        })
    }

    fn target_risk(&self, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let severity = match ctx.assessment.risk_level {
            RiskLevel::Critical => AlertSeverity::Critical,
            RiskLevel::High => AlertSeverity::Warning,
            RiskLevel::Low | RiskLevel::Medium => return None,
        };
        let message = match ctx.assessment.delay_probability {
            Some(p) => format!(
                "Target date is at {} risk: {:.0}% chance of finishing late",
                ctx.assessment.risk_level.as_str(),
                p
            ),
            None => format!(
                "Forecast is at {} risk due to unpredictable velocity",
                ctx.assessment.risk_level.as_str()
            ),
        };
        Some(Detection {
            alert_type: AlertType::TargetRisk,
            severity,
            message,
        })
    }

    fn variance_high(&self, ctx: &DetectionContext<'_>) -> Option<Detection> {
        if ctx.forecast.cv_bucket != CvBucket::High {
            return None;
        }
        Some(Detection {
            alert_type: AlertType::VarianceHigh,
            severity: AlertSeverity::Info,
            message: format!(
                "Velocity varies {:.0}% around its mean; forecast range is wide",
                ctx.forecast.cv_percent
            ),
        })
    }

    fn stagnation(&self, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let mut ordered: Vec<&VelocitySnapshot> = ctx.snapshots.iter().collect();
        ordered.sort_by_key(|s| s.period_start);

        let latest = ordered.last()?;
        if latest.tasks_completed != 0 {
            return None;
        }
        let previous_also_idle = ordered
            .len()
            .checked_sub(2)
            .map(|i| ordered[i].tasks_completed == 0)
            .unwrap_or(false);

        Some(Detection {
            alert_type: AlertType::Stagnation,
            severity: if previous_also_idle {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            },
            message: if previous_also_idle {
                "No tasks completed in the last two periods".to_string()
            } else {
                "No tasks completed in the latest period".to_string()
            },
        })
    }
}

fn resolved_copy(alert: &BurndownAlert, now: Time) -> Option<BurndownAlert> {
    let mut resolved = alert.clone();
    resolved.resolve(now).ok()?;
    Some(resolved)
}
