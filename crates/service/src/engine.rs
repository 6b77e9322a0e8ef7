//! The forecast generation cycle and the operations built around it.

use std::sync::Arc;

use burndown_core::{
    AlertId, BoardId, BurndownAlert, BurndownPrediction, ConfidenceLevel, SprintMilestone, Time,
    VelocitySnapshot,
};
use burndown_forecast::{
    AlertManager, DetectionContext, RiskAssessor, StatisticalForecaster, SuggestionEngine,
    VelocitySnapshotCollector,
};
use burndown_storage::Storage;
use chrono::{NaiveTime, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{Result, ServiceError};
use crate::locks::BoardLocks;
use crate::notifier::{AlertEvent, AlertNotifier, TracingNotifier};
use crate::source::{remaining_work, BoardSource};
use crate::store::{CycleOutcome, PredictionStore};

/// Options for one generation request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerateRequest {
    /// Deadline; the next incomplete milestone is used when absent
    pub target_date: Option<Time>,
    /// Overrides the configured confidence level
    pub confidence_level: Option<ConfidenceLevel>,
}

impl GenerateRequest {
    /// Request with an explicit target.
    pub fn with_target(mut self, target_date: Time) -> Self {
        self.target_date = Some(target_date);
        self
    }

    /// Request with an explicit confidence level.
    pub fn with_confidence(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = Some(level);
        self
    }
}

/// Burndown forecasting service.
///
/// Cheap to clone; clones share storage, locks and notifier, so scheduled
/// and on-demand triggers serialize their commits per board.
#[derive(Clone)]
pub struct ForecastService {
    storage: Arc<dyn Storage>,
    source: Arc<dyn BoardSource>,
    store: PredictionStore,
    locks: Arc<BoardLocks>,
    notifier: Arc<dyn AlertNotifier>,
    config: EngineConfig,
    collector: VelocitySnapshotCollector,
    forecaster: StatisticalForecaster,
    assessor: RiskAssessor,
    alerts: AlertManager,
    suggestions: SuggestionEngine,
}

impl ForecastService {
    /// Create a service.
    pub fn new(
        storage: Arc<dyn Storage>,
        source: Arc<dyn BoardSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store: PredictionStore::new(Arc::clone(&storage)),
            storage,
            source,
            locks: Arc::new(BoardLocks::new()),
            notifier: Arc::new(TracingNotifier),
            collector: VelocitySnapshotCollector::new(),
            forecaster: StatisticalForecaster::new().with_basis(config.basis),
            assessor: RiskAssessor::new(),
            alerts: AlertManager::new().with_config(config.alerts),
            suggestions: SuggestionEngine::new(),
            config,
        }
    }

    /// Set the alert notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Share a lock table with other services writing to the same storage.
    pub fn with_locks(mut self, locks: Arc<BoardLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // === Snapshots ===

    /// Recompute and store every closed period from `first_period_start` up to `until`.
    ///
    /// When `first_period_start` is `None`, periods start at midnight (UTC)
    /// of the board's earliest completion. Existing snapshots for the same
    /// periods are replaced.
    pub async fn refresh_snapshots(
        &self,
        board_id: &BoardId,
        first_period_start: Option<Time>,
        until: Time,
    ) -> Result<Vec<VelocitySnapshot>> {
        let activity = self.source.activity(board_id).await?;

        let start = match first_period_start {
            Some(start) => start,
            None => match activity.completions.iter().map(|c| c.completed_at).min() {
                Some(first) => first.date_naive().and_time(NaiveTime::MIN).and_utc(),
                None => {
                    debug!(board = %board_id, "No completions; nothing to snapshot");
                    return Ok(Vec::new());
                }
            },
        };

        let snapshots =
            self.collector
                .backfill(board_id, start, self.config.period_length(), until, &activity)?;
        for snapshot in &snapshots {
            self.storage.save_snapshot(snapshot).await?;
        }

        info!(board = %board_id, count = snapshots.len(), "Refreshed velocity snapshots");
        Ok(snapshots)
    }

    /// Stored snapshots for a board, oldest first.
    pub async fn snapshots(&self, board_id: &BoardId) -> Result<Vec<VelocitySnapshot>> {
        Ok(self.storage.list_snapshots(board_id).await?)
    }

    // === Generation ===

    /// Run one generation cycle as of the current time.
    pub async fn generate(
        &self,
        board_id: &BoardId,
        request: GenerateRequest,
    ) -> Result<BurndownPrediction> {
        self.generate_at(board_id, request, Utc::now()).await
    }

    /// Run one generation cycle as of `now`.
    ///
    /// Forecast, risk and suggestions are computed without holding any
    /// lock. Alert evaluation and the commit run under the board lock, and
    /// notifications go out only once the commit has succeeded.
    pub async fn generate_at(
        &self,
        board_id: &BoardId,
        request: GenerateRequest,
        now: Time,
    ) -> Result<BurndownPrediction> {
        let confidence = request
            .confidence_level
            .unwrap_or(self.config.confidence_level);
        let basis = self.forecaster.basis();

        let snapshots = self.storage.list_snapshots(board_id).await?;
        let open_tasks = self.source.open_tasks(board_id).await?;
        let target_date = match request.target_date {
            Some(target) => Some(target),
            None => {
                let milestones = self.source.milestones(board_id).await?;
                SprintMilestone::next_target(&milestones).map(|m| m.target_date)
            }
        };

        let remaining = remaining_work(&open_tasks, basis);
        let forecast = self
            .forecaster
            .forecast(&snapshots, remaining, confidence, now)?;
        let assessment = self.assessor.assess(&forecast, target_date);
        let suggestions = self.suggestions.suggest(
            assessment.risk_level,
            forecast.trend,
            forecast.cv_bucket,
            assessment.delay_probability,
        );

        let outcome = CycleOutcome {
            board_id: board_id.clone(),
            forecast,
            assessment,
            suggestions,
            target_date,
            generated_at: now,
        };

        let (prediction, events) = {
            let _guard = self.locks.lock(board_id).await;

            let open_alerts = self.storage.list_open_alerts(board_id).await?;
            // Remaining work is only comparable within one basis
            let previous_remaining_work = self
                .storage
                .load_latest_prediction(board_id)
                .await?
                .filter(|p| p.basis == basis)
                .map(|p| p.remaining_work);

            let ctx = DetectionContext {
                forecast: &outcome.forecast,
                assessment: &outcome.assessment,
                snapshots: &snapshots,
                previous_remaining_work,
            };
            let transitions = self.alerts.evaluate(board_id, &ctx, &open_alerts, now);
            let events: Vec<AlertEvent> = transitions
                .iter()
                .filter_map(AlertEvent::from_transition)
                .collect();

            let prediction = self.store.persist(&outcome, transitions).await?;
            (prediction, events)
        };

        for event in &events {
            self.notifier.notify(event).await;
        }

        Ok(prediction)
    }

    // === Queries ===

    /// Most recent prediction for a board.
    pub async fn latest(&self, board_id: &BoardId) -> Result<Option<BurndownPrediction>> {
        Ok(self.storage.load_latest_prediction(board_id).await?)
    }

    /// All predictions for a board in generation order.
    pub async fn history(&self, board_id: &BoardId) -> Result<Vec<BurndownPrediction>> {
        Ok(self.storage.list_predictions(board_id).await?)
    }

    /// Active and acknowledged alerts.
    pub async fn open_alerts(&self, board_id: &BoardId) -> Result<Vec<BurndownAlert>> {
        Ok(self.storage.list_open_alerts(board_id).await?)
    }

    /// Every alert, resolved ones included.
    pub async fn alerts(&self, board_id: &BoardId) -> Result<Vec<BurndownAlert>> {
        Ok(self.storage.list_alerts(board_id).await?)
    }

    // === User alert operations ===

    /// Acknowledge an active alert.
    pub async fn acknowledge(&self, board_id: &BoardId, alert_id: AlertId) -> Result<BurndownAlert> {
        self.acknowledge_at(board_id, alert_id, Utc::now()).await
    }

    /// Acknowledge an active alert as of `now`.
    pub async fn acknowledge_at(
        &self,
        board_id: &BoardId,
        alert_id: AlertId,
        now: Time,
    ) -> Result<BurndownAlert> {
        self.apply_user_action(board_id, alert_id, now, |alert, now| alert.acknowledge(now))
            .await
    }

    /// Resolve an active or acknowledged alert.
    pub async fn resolve(&self, board_id: &BoardId, alert_id: AlertId) -> Result<BurndownAlert> {
        self.resolve_at(board_id, alert_id, Utc::now()).await
    }

    /// Resolve an active or acknowledged alert as of `now`.
    pub async fn resolve_at(
        &self,
        board_id: &BoardId,
        alert_id: AlertId,
        now: Time,
    ) -> Result<BurndownAlert> {
        self.apply_user_action(board_id, alert_id, now, |alert, now| alert.resolve(now))
            .await
    }

    async fn apply_user_action<F>(
        &self,
        board_id: &BoardId,
        alert_id: AlertId,
        now: Time,
        action: F,
    ) -> Result<BurndownAlert>
    where
        F: FnOnce(&mut BurndownAlert, Time) -> std::result::Result<(), burndown_core::InvalidTransition>
            + Send,
    {
        let _guard = self.locks.lock(board_id).await;

        let mut alert = self
            .storage
            .load_alert(board_id, alert_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("alert {} on board {}", alert_id, board_id)))?;

        if let Err(e) = action(&mut alert, now) {
            warn!(board = %board_id, alert = %alert_id, "Rejected alert transition: {}", e);
            return Err(e.into());
        }

        self.storage.update_alert(&alert).await?;
        info!(board = %board_id, alert = %alert_id, status = alert.status.as_str(), "Alert updated");
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{AlertEventKind, ChannelNotifier};
    use crate::source::BoardExport;
    use burndown_core::{
        AlertSeverity, AlertStatus, AlertType, MemberId, OpenTask, RiskLevel, TaskCompletion,
        TaskRef, VelocityBasis,
    };
    use burndown_storage::{JsonStorage, SqliteStorage};
    use chrono::{Duration, TimeZone};

    fn start() -> Time {
        chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn board() -> BoardId {
        BoardId::new("web")
    }

    fn export(weekly: &[u32], open: usize) -> BoardExport {
        let mut completions = Vec::new();
        for (week, count) in weekly.iter().enumerate() {
            for i in 0..*count {
                completions.push(TaskCompletion {
                    task: TaskRef::new(format!("w{}-{}", week, i)),
                    completed_at: start() + Duration::weeks(week as i64) + Duration::hours(i as i64),
                    story_points: 2.0,
                    completed_by: Some(MemberId::new(format!("m{}", i % 3))),
                });
            }
        }
        BoardExport {
            board_id: board(),
            completions,
            reopenings: Vec::new(),
            open_tasks: (0..open)
                .map(|i| OpenTask {
                    task: TaskRef::new(format!("open-{}", i)),
                    story_points: 1.0,
                })
                .collect(),
            milestones: vec![
                SprintMilestone {
                    name: "alpha".to_string(),
                    target_date: start() + Duration::weeks(2),
                    completed: true,
                },
                SprintMilestone {
                    name: "release".to_string(),
                    target_date: start() + Duration::weeks(18),
                    completed: false,
                },
            ],
        }
    }

    async fn memory() -> Arc<dyn Storage> {
        Arc::new(SqliteStorage::in_memory().await.unwrap())
    }

    async fn service_with(
        storage: Arc<dyn Storage>,
        export: BoardExport,
        config: EngineConfig,
        weeks: i64,
    ) -> ForecastService {
        let service = ForecastService::new(storage, Arc::new(export), config);
        service
            .refresh_snapshots(&board(), None, start() + Duration::weeks(weeks))
            .await
            .unwrap();
        service
    }

    fn open_of(alerts: &[BurndownAlert], alert_type: AlertType) -> Vec<&BurndownAlert> {
        alerts
            .iter()
            .filter(|a| a.alert_type == alert_type && a.status.is_open())
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_reference_board() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let service = service_with(
            storage,
            export(&[8, 9, 7, 10, 8, 9, 11, 8], 35),
            EngineConfig::default(),
            8,
        )
        .await;
        assert_eq!(service.snapshots(&board()).await.unwrap().len(), 8);

        let now = start() + Duration::weeks(8);
        let prediction = service
            .generate_at(&board(), GenerateRequest::default(), now)
            .await
            .unwrap();

        assert_eq!(prediction.predicted_completion_date, now + Duration::weeks(4));
        assert!(prediction.bounds_are_ordered());
        assert_eq!(prediction.sample_size, 8);
        assert_eq!(prediction.remaining_work, 35.0);
        // Falls back to the next incomplete milestone
        assert_eq!(prediction.target_date, Some(start() + Duration::weeks(18)));
        assert_eq!(prediction.risk_level, RiskLevel::Low);
        assert!(!prediction.actionable_suggestions.is_empty());

        let late_target = prediction.completion_date_lower_bound - Duration::weeks(1);
        let critical = service
            .generate_at(&board(), GenerateRequest::default().with_target(late_target), now)
            .await
            .unwrap();
        assert_eq!(critical.risk_level, RiskLevel::Critical);
        assert!(critical.delay_probability.unwrap() > 50.0);

        let alerts = service.open_alerts(&board()).await.unwrap();
        let target_risk = open_of(&alerts, AlertType::TargetRisk);
        assert_eq!(target_risk.len(), 1);
        assert_eq!(target_risk[0].severity, AlertSeverity::Critical);

        let history = service.history(&board()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(service.latest(&board()).await.unwrap().unwrap().id, critical.id);
    }

    #[tokio::test]
    async fn test_insufficient_history_writes_nothing() {
        let service = service_with(memory().await, export(&[8, 9], 10), EngineConfig::default(), 2).await;

        let err = service
            .generate_at(&board(), GenerateRequest::default(), start() + Duration::weeks(2))
            .await
            .unwrap_err();
        assert!(err.is_insufficient_data());
        assert!(service.latest(&board()).await.unwrap().is_none());
        assert!(service.alerts(&board()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alerts_deduplicated_and_auto_resolved() {
        let storage = memory().await;
        let (notifier, mut events) = ChannelNotifier::new(32);
        let notifier = Arc::new(notifier);

        let stalled = service_with(
            Arc::clone(&storage),
            export(&[8, 9, 7, 10, 8, 9, 11, 0], 20),
            EngineConfig::default(),
            8,
        )
        .await
        .with_notifier(notifier.clone());

        let now = start() + Duration::weeks(8);
        stalled.generate_at(&board(), GenerateRequest::default(), now).await.unwrap();
        stalled
            .generate_at(&board(), GenerateRequest::default(), now + Duration::hours(1))
            .await
            .unwrap();

        let alerts = stalled.alerts(&board()).await.unwrap();
        let stagnation = open_of(&alerts, AlertType::Stagnation);
        assert_eq!(stagnation.len(), 1);
        assert_eq!(stagnation[0].updated_at, now + Duration::hours(1));

        let mut created = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.alert_type == AlertType::Stagnation {
                created.push(event.kind);
            }
        }
        assert_eq!(created, vec![AlertEventKind::Created]);

        // Work resumes in week 9
        let recovered = service_with(
            Arc::clone(&storage),
            export(&[8, 9, 7, 10, 8, 9, 11, 0, 9], 20),
            EngineConfig::default(),
            9,
        )
        .await
        .with_notifier(notifier);
        recovered
            .generate_at(&board(), GenerateRequest::default(), start() + Duration::weeks(9))
            .await
            .unwrap();

        let alerts = recovered.alerts(&board()).await.unwrap();
        assert!(open_of(&alerts, AlertType::Stagnation).is_empty());
        let resolved = alerts
            .iter()
            .find(|a| a.alert_type == AlertType::Stagnation)
            .unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_at, Some(start() + Duration::weeks(9)));

        let resolved_event = std::iter::from_fn(|| events.try_recv().ok())
            .find(|e| e.alert_type == AlertType::Stagnation);
        assert_eq!(resolved_event.map(|e| e.kind), Some(AlertEventKind::AutoResolved));
    }

    #[tokio::test]
    async fn test_concurrent_cycles_keep_one_open_alert() {
        let service = service_with(
            memory().await,
            export(&[8, 9, 7, 10, 8, 9, 11, 0], 20),
            EngineConfig::default(),
            8,
        )
        .await;
        let other = service.clone();
        let now = start() + Duration::weeks(8);

        let board_a = board();
        let board_b = board();
        let (a, b) = tokio::join!(
            service.generate_at(&board_a, GenerateRequest::default(), now),
            other.generate_at(&board_b, GenerateRequest::default(), now + Duration::minutes(1)),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(service.history(&board()).await.unwrap().len(), 2);
        let alerts = service.alerts(&board()).await.unwrap();
        assert_eq!(
            alerts
                .iter()
                .filter(|a| a.alert_type == AlertType::Stagnation)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_scope_creep_between_cycles() {
        let storage = memory().await;
        let weekly = [8, 9, 7, 10, 8, 9, 11, 8];
        let now = start() + Duration::weeks(8);

        let before = service_with(Arc::clone(&storage), export(&weekly, 35), EngineConfig::default(), 8).await;
        before.generate_at(&board(), GenerateRequest::default(), now).await.unwrap();

        // 35 -> 50 open tasks is 43% growth, above twice the 15% default
        let after = service_with(Arc::clone(&storage), export(&weekly, 50), EngineConfig::default(), 8).await;
        after
            .generate_at(&board(), GenerateRequest::default(), now + Duration::days(1))
            .await
            .unwrap();

        let alerts = after.open_alerts(&board()).await.unwrap();
        let creep = open_of(&alerts, AlertType::ScopeCreep);
        assert_eq!(creep.len(), 1);
        assert_eq!(creep[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_story_point_basis() {
        let config = EngineConfig::default().with_basis(VelocityBasis::StoryPoints);
        let service = service_with(memory().await, export(&[8, 9, 7, 10, 8, 9, 11, 8], 35), config, 8).await;
        let now = start() + Duration::weeks(8);

        let prediction = service
            .generate_at(
                &board(),
                GenerateRequest::default().with_confidence(ConfidenceLevel::P99),
                now,
            )
            .await
            .unwrap();

        // 35 points at 17.5 points per week
        assert_eq!(prediction.basis, VelocityBasis::StoryPoints);
        assert_eq!(prediction.confidence_level, ConfidenceLevel::P99);
        assert_eq!(prediction.predicted_completion_date, now + Duration::weeks(2));
    }

    #[tokio::test]
    async fn test_user_alert_lifecycle() {
        let service = service_with(
            memory().await,
            export(&[8, 9, 7, 10, 8, 9, 11, 0], 20),
            EngineConfig::default(),
            8,
        )
        .await;
        service
            .generate_at(&board(), GenerateRequest::default(), start() + Duration::weeks(8))
            .await
            .unwrap();

        let alerts = service.open_alerts(&board()).await.unwrap();
        let id = open_of(&alerts, AlertType::Stagnation)[0].id;

        let acked_at = start() + Duration::weeks(8) + Duration::hours(3);
        let acked = service.acknowledge_at(&board(), id, acked_at).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_at, Some(acked_at));
        assert_eq!(acked.updated_at, acked_at);
        assert!(matches!(
            service.acknowledge(&board(), id).await,
            Err(ServiceError::InvalidTransition(_))
        ));

        let resolved_at = acked_at + Duration::days(1);
        let resolved = service.resolve_at(&board(), id, resolved_at).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_at, Some(resolved_at));
        let stored = service.alerts(&board()).await.unwrap();
        assert_eq!(
            stored.iter().find(|a| a.id == id).and_then(|a| a.resolved_at),
            Some(resolved_at)
        );
        assert!(matches!(
            service.resolve(&board(), id).await,
            Err(ServiceError::InvalidTransition(_))
        ));

        assert!(matches!(
            service.acknowledge(&board(), AlertId::new()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
