//! Alert notifications.
//!
//! Notifiers are fire-and-forget: they run after a cycle has committed and
//! their failures never affect stored state.

use async_trait::async_trait;
use burndown_core::{AlertId, AlertSeverity, AlertTransition, AlertType, BoardId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// What happened to the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    /// Newly raised
    Created,
    /// Condition cleared
    AutoResolved,
}

/// One notification about an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Board the alert belongs to
    pub board_id: BoardId,
    /// Alert affected
    pub alert_id: AlertId,
    /// Condition
    pub alert_type: AlertType,
    /// Severity at the time of the event
    pub severity: AlertSeverity,
    /// Alert message
    pub message: String,
    /// Created or resolved
    pub kind: AlertEventKind,
}

impl AlertEvent {
    /// Event for a transition, if the transition is one users hear about.
    pub fn from_transition(transition: &AlertTransition) -> Option<Self> {
        if !transition.is_notifiable() {
            return None;
        }
        let kind = match transition {
            AlertTransition::Created(_) => AlertEventKind::Created,
            _ => AlertEventKind::AutoResolved,
        };
        let alert = transition.alert();
        Some(Self {
            board_id: alert.board_id.clone(),
            alert_id: alert.id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message.clone(),
            kind,
        })
    }
}

/// Receives alert events after a successful commit.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Deliver one event.
    async fn notify(&self, event: &AlertEvent);
}

/// Logs alert events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, event: &AlertEvent) {
        match event.kind {
            AlertEventKind::Created => info!(
                board = %event.board_id,
                alert = %event.alert_id,
                alert_type = %event.alert_type,
                severity = event.severity.as_str(),
                "Alert raised: {}",
                event.message
            ),
            AlertEventKind::AutoResolved => info!(
                board = %event.board_id,
                alert = %event.alert_id,
                alert_type = %event.alert_type,
                "Alert resolved"
            ),
        }
    }
}

/// Forwards alert events to a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<AlertEvent>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertNotifier for ChannelNotifier {
    async fn notify(&self, event: &AlertEvent) {
        // Never block a cycle on a slow consumer
        if let Err(e) = self.tx.try_send(event.clone()) {
            warn!(alert = %event.alert_id, "Dropped alert event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burndown_core::BurndownAlert;

    fn alert() -> BurndownAlert {
        BurndownAlert::raise(
            BoardId::new("b"),
            AlertType::ScopeCreep,
            AlertSeverity::Critical,
            "Remaining work grew 40%",
            chrono::Utc::now(),
        )
    }

    #[test]
    fn test_updates_are_not_events() {
        assert!(AlertEvent::from_transition(&AlertTransition::Updated(alert())).is_none());

        let mut resolved = alert();
        resolved.resolve(chrono::Utc::now()).unwrap();
        let event = AlertEvent::from_transition(&AlertTransition::AutoResolved(resolved)).unwrap();
        assert_eq!(event.kind, AlertEventKind::AutoResolved);

        let created = AlertEvent::from_transition(&AlertTransition::Created(alert())).unwrap();
        assert_eq!(created.kind, AlertEventKind::Created);
        assert_eq!(created.severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers_and_drops_when_full() {
        let (notifier, mut rx) = ChannelNotifier::new(1);
        let event = AlertEvent::from_transition(&AlertTransition::Created(alert())).unwrap();

        notifier.notify(&event).await;
        notifier.notify(&event).await;

        assert_eq!(rx.recv().await, Some(event));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_notifier_survives_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new(4);
        drop(rx);
        let event = AlertEvent::from_transition(&AlertTransition::Created(alert())).unwrap();
        notifier.notify(&event).await;
    }
}
