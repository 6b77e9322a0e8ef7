//! Alert model - anomaly notices and their lifecycle.

use serde::{Deserialize, Serialize};
use crate::id::{AlertId, BoardId};
use crate::Time;

/// Anomaly condition an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Latest velocity fell well below the mean while trending down
    VelocityDrop,
    /// Remaining work grew between cycles
    ScopeCreep,
    /// Target date is at high or critical risk
    TargetRisk,
    /// Velocity is highly variable
    VarianceHigh,
    /// Nothing was completed in the latest period
    Stagnation,
}

impl AlertType {
    /// Every alert type, in evaluation order.
    pub const ALL: [AlertType; 5] = [
        AlertType::VelocityDrop,
        AlertType::ScopeCreep,
        AlertType::TargetRisk,
        AlertType::VarianceHigh,
        AlertType::Stagnation,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::VelocityDrop => "velocity_drop",
            AlertType::ScopeCreep => "scope_creep",
            AlertType::TargetRisk => "target_risk",
            AlertType::VarianceHigh => "variance_high",
            AlertType::Stagnation => "stagnation",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational
    Info,
    /// Needs attention
    Warning,
    /// Needs action now
    Critical,
}

impl AlertSeverity {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Raised and not yet seen
    Active,
    /// Seen by a user, still visible
    Acknowledged,
    /// Closed; terminal
    Resolved,
}

impl AlertStatus {
    /// Active or acknowledged.
    pub fn is_open(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::Active, AlertStatus::Acknowledged)
                | (AlertStatus::Active, AlertStatus::Resolved)
                | (AlertStatus::Acknowledged, AlertStatus::Resolved)
        )
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// Rejected lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid alert transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// Current status
    pub from: AlertStatus,
    /// Requested status
    pub to: AlertStatus,
}

/// An anomaly notice tied to a board and an alert type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurndownAlert {
    /// Unique identifier
    pub id: AlertId,

    /// Board the alert belongs to
    pub board_id: BoardId,

    /// Condition reported
    pub alert_type: AlertType,

    /// Current severity
    pub severity: AlertSeverity,

    /// Lifecycle state
    pub status: AlertStatus,

    /// Human-readable description
    pub message: String,

    /// When first raised
    pub created_at: Time,

    /// Last time the detection rule refreshed it
    pub updated_at: Time,

    /// When acknowledged
    pub acknowledged_at: Option<Time>,

    /// When resolved
    pub resolved_at: Option<Time>,
}

impl BurndownAlert {
    /// Raise a new active alert.
    pub fn raise(
        board_id: BoardId,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        now: Time,
    ) -> Self {
        Self {
            id: AlertId::new(),
            board_id,
            alert_type,
            severity,
            status: AlertStatus::Active,
            message: message.into(),
            created_at: now,
            updated_at: now,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    /// Refresh an open alert after its rule fired again.
    pub fn refresh(&mut self, severity: AlertSeverity, message: impl Into<String>, now: Time) {
        self.severity = severity;
        self.message = message.into();
        self.updated_at = now;
    }

    /// Mark as acknowledged.
    pub fn acknowledge(&mut self, now: Time) -> Result<(), InvalidTransition> {
        self.transition(AlertStatus::Acknowledged)?;
        self.acknowledged_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Mark as resolved.
    pub fn resolve(&mut self, now: Time) -> Result<(), InvalidTransition> {
        self.transition(AlertStatus::Resolved)?;
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn transition(&mut self, next: AlertStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A change to alert state computed by one generation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "alert", rename_all = "snake_case")]
pub enum AlertTransition {
    /// A new alert was raised
    Created(BurndownAlert),
    /// An open alert was refreshed in place
    Updated(BurndownAlert),
    /// An open alert's condition cleared
    AutoResolved(BurndownAlert),
}

impl AlertTransition {
    /// The alert state after the transition.
    pub fn alert(&self) -> &BurndownAlert {
        match self {
            AlertTransition::Created(a)
            | AlertTransition::Updated(a)
            | AlertTransition::AutoResolved(a) => a,
        }
    }

    /// Whether the notification collaborator should hear about it.
    pub fn is_notifiable(&self) -> bool {
        !matches!(self, AlertTransition::Updated(_))
    }
}
