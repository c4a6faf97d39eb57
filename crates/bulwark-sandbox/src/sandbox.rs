//! Snapshot-backed staging and promotion of changes.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bulwark_events::EventPipeline;
use bulwark_registry::ComponentRegistry;
use bulwark_remediation::{VersionSnapshot, VersionStore};
use bulwark_types::{
    event_types, ChangeId, ComponentId, Event, EventPriority, FleetMetrics, Payload, SnapshotId,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::applier::{NullApplier, ProductionApplier};
use crate::change::{ChangeKind, ChangeResult, CheckResult, SandboxChange};
use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::metrics::MetricsProvider;
use crate::snapshot::SystemSnapshot;
use crate::validation;

/// Sandbox lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Idle,
    Cloning,
    Testing,
    Validating,
    Applying,
    Error,
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SandboxState::Idle => "idle",
            SandboxState::Cloning => "cloning",
            SandboxState::Testing => "testing",
            SandboxState::Validating => "validating",
            SandboxState::Applying => "applying",
            SandboxState::Error => "error",
        };
        write!(f, "{s}")
    }
}

struct StoredSnapshot {
    seq: u64,
    snapshot: SystemSnapshot,
}

struct TrackedChange {
    seq: u64,
    change: SandboxChange,
    result: ChangeResult,
}

impl TrackedChange {
    /// Promoted or failed; nothing further can happen to it.
    fn settled(&self) -> bool {
        self.result.applied || !self.result.success
    }
}

/// Tests changes against a staged copy of current state before anything
/// reaches production.
///
/// One change is in flight at a time; concurrent callers wait their turn.
pub struct Sandbox {
    config: SandboxConfig,
    registry: Arc<ComponentRegistry>,
    versions: Arc<VersionStore>,
    metrics: Arc<dyn MetricsProvider>,
    applier: Arc<dyn ProductionApplier>,
    events: Arc<EventPipeline>,
    state: RwLock<SandboxState>,
    in_flight: tokio::sync::Mutex<()>,
    snapshots: DashMap<SnapshotId, StoredSnapshot>,
    changes: DashMap<ChangeId, TrackedChange>,
    seq: AtomicU64,
}

impl Sandbox {
    /// Sandbox reading metrics from `registry` and promoting through
    /// [`NullApplier`].
    pub fn new(
        config: SandboxConfig,
        registry: Arc<ComponentRegistry>,
        versions: Arc<VersionStore>,
        events: Arc<EventPipeline>,
    ) -> Self {
        Self {
            config,
            metrics: registry.clone(),
            registry,
            versions,
            applier: Arc::new(NullApplier),
            events,
            state: RwLock::new(SandboxState::Idle),
            in_flight: tokio::sync::Mutex::new(()),
            snapshots: DashMap::new(),
            changes: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_applier(mut self, applier: Arc<dyn ProductionApplier>) -> Self {
        self.applier = applier;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn state(&self) -> SandboxState {
        *self.state.read()
    }

    fn transition(&self, next: SandboxState) {
        let mut state = self.state.write();
        let previous = *state;
        debug!(from = %previous, to = %next, "Sandbox transition");
        *state = next;
    }

    /// Capture registry health, current versions and fleet metrics.
    pub async fn create_snapshot(&self) -> SystemSnapshot {
        let snapshot = SystemSnapshot {
            id: SnapshotId::generate(),
            taken_at: Utc::now(),
            handles: self.registry.members(),
            versions: self.versions.current_versions(),
            metrics: self.metrics.fleet_metrics().await,
        };
        self.store_snapshot(snapshot.clone());
        info!(snapshot_id = %snapshot.id, components = snapshot.handles.len(), "Snapshot created");
        snapshot
    }

    pub fn snapshot(&self, id: SnapshotId) -> Option<SystemSnapshot> {
        self.snapshots.get(&id).map(|s| s.snapshot.clone())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn store_snapshot(&self, snapshot: SystemSnapshot) {
        let keep = snapshot.id;
        let seq = self.next_seq();
        self.snapshots.insert(keep, StoredSnapshot { seq, snapshot });

        let cap = self.config.max_snapshots.max(1);
        while self.snapshots.len() > cap {
            let oldest = self
                .snapshots
                .iter()
                .filter(|s| *s.key() != keep)
                .min_by_key(|s| s.seq)
                .map(|s| *s.key());
            let Some(id) = oldest else { break };
            self.snapshots.remove(&id);
            debug!(snapshot_id = %id, "Evicted snapshot");
        }
    }

    fn track(&self, change: SandboxChange, result: ChangeResult) {
        let keep = change.id;
        let seq = self.next_seq();
        self.changes.insert(keep, TrackedChange { seq, change, result });

        let cap = self.config.max_tracked_changes.max(1);
        while self.changes.len() > cap {
            let oldest = self
                .changes
                .iter()
                .filter(|t| *t.key() != keep)
                .min_by_key(|t| (!t.settled(), t.seq))
                .map(|t| *t.key());
            let Some(id) = oldest else { break };
            self.changes.remove(&id);
            debug!(change_id = %id, "Evicted change result");
        }
    }

    /// State the change is staged on: the target's version recorded in the
    /// snapshot, or its current version if the snapshot predates it.
    fn staging_base(
        &self,
        snapshot: &SystemSnapshot,
        target: &ComponentId,
    ) -> SandboxResult<Option<serde_json::Value>> {
        match snapshot.versions.get(target) {
            Some(&version) => self
                .versions
                .get(target, version)
                .map(|v| Some(v.state))
                .ok_or_else(|| SandboxError::VersionPruned {
                    component: target.clone(),
                    version,
                }),
            None => Ok(self.versions.current(target).map(|v| v.state)),
        }
    }

    /// Stage `change` against `snapshot` (or a fresh one) and validate it.
    ///
    /// Validation failures are reported in the returned [`ChangeResult`],
    /// never as errors. With `auto_rollback` set, a failed change restores
    /// the snapshot's registry health and version pointers.
    #[instrument(skip(self, change), fields(change_id = %change.id, target = %change.target, kind = %change.kind))]
    pub async fn apply_change_in_sandbox(
        &self,
        change: SandboxChange,
        snapshot: Option<SnapshotId>,
    ) -> SandboxResult<ChangeResult> {
        if !self.registry.contains(change.target.as_str()) {
            return Err(SandboxError::ComponentNotFound(change.target.clone()));
        }
        let snapshot = match snapshot {
            Some(id) => Some(self.snapshot(id).ok_or(SandboxError::SnapshotNotFound(id))?),
            None => None,
        };

        let _turn = self.in_flight.lock().await;

        self.transition(SandboxState::Cloning);
        let snapshot = match snapshot {
            Some(s) => s,
            None => self.create_snapshot().await,
        };

        let base = match self.staging_base(&snapshot, &change.target) {
            Ok(base) => base,
            Err(e) => {
                self.transition(SandboxState::Idle);
                return Err(e);
            }
        };

        self.transition(SandboxState::Testing);
        let staged_state = validation::stage(base.as_ref(), &change);

        let (checks, metrics_after, error) = if self.config.require_validation {
            self.transition(SandboxState::Validating);
            self.validate(&change, &staged_state, &snapshot.metrics).await
        } else {
            (Vec::new(), self.metrics.fleet_metrics().await, None)
        };

        let validation_passed = error.is_none() && checks.iter().all(|c| c.passed);
        let degradation_detected = self.config.require_validation
            && validation::degraded(
                &snapshot.metrics,
                &metrics_after,
                self.config.degradation_ratio,
            );
        let success = validation_passed && !degradation_detected;

        let mut rollback_applied = false;
        if success {
            self.transition(SandboxState::Idle);
        } else {
            self.transition(SandboxState::Error);
            if self.config.auto_rollback {
                self.restore(&snapshot);
                rollback_applied = true;
            }
        }

        let result = ChangeResult {
            change_id: change.id,
            target: change.target.clone(),
            kind: change.kind,
            success,
            validation_passed,
            degradation_detected,
            checks,
            metrics_before: snapshot.metrics,
            metrics_after,
            snapshot_id: snapshot.id,
            rollback_applied,
            staged_state,
            error,
            applied: false,
            completed_at: Utc::now(),
        };

        if success {
            info!("Change validated");
        } else {
            let failed: Vec<&str> = result.failed_checks().map(|c| c.name.as_str()).collect();
            warn!(
                failed_checks = ?failed,
                degraded = degradation_detected,
                rollback = rollback_applied,
                "Change failed validation"
            );
        }
        self.publish_result(&result).await;

        self.track(change, result.clone());
        Ok(result)
    }

    /// Promote a validated change: run the production applier, then record
    /// the staged state as the target's new current version.
    #[instrument(skip(self, change_id), fields(change_id = %change_id))]
    pub async fn apply_to_production(&self, change_id: ChangeId) -> SandboxResult<VersionSnapshot> {
        let (change, staged_state) = {
            let tracked = self
                .changes
                .get(&change_id)
                .ok_or(SandboxError::ChangeNotFound(change_id))?;
            if tracked.result.applied {
                return Err(SandboxError::AlreadyApplied(change_id));
            }
            if !tracked.result.success {
                return Err(SandboxError::NotApproved(change_id));
            }
            (tracked.change.clone(), tracked.result.staged_state.clone())
        };

        let _turn = self.in_flight.lock().await;
        // a concurrent promotion may have won the lock first
        if self
            .changes
            .get(&change_id)
            .is_some_and(|t| t.result.applied)
        {
            return Err(SandboxError::AlreadyApplied(change_id));
        }

        self.transition(SandboxState::Applying);
        let applied = AssertUnwindSafe(self.applier.apply(&change, &staged_state))
            .catch_unwind()
            .await;
        match applied {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.transition(SandboxState::Error);
                warn!(error = %e, "Production apply failed");
                return Err(e);
            }
            Err(_) => {
                self.transition(SandboxState::Error);
                warn!("Production applier panicked");
                return Err(SandboxError::Production("applier panicked".to_string()));
            }
        }

        let mut metadata = Payload::new();
        metadata.insert("change_id".into(), serde_json::json!(change.id));
        metadata.insert("kind".into(), serde_json::json!(change.kind));
        metadata.insert("description".into(), serde_json::json!(change.description));
        let version = self
            .versions
            .record(&change.target, staged_state, metadata);

        if let Some(mut tracked) = self.changes.get_mut(&change_id) {
            tracked.result.applied = true;
        }
        self.transition(SandboxState::Idle);
        info!(version = version.version, "Change promoted to production");

        let event = Event::new(
            event_types::SANDBOX_PROMOTED,
            change.target.clone(),
            EventPriority::High,
        )
        .with_field("change_id", change.id)
        .with_field("version", version.version);
        self.events.publish(event).await;

        Ok(version)
    }

    pub fn result(&self, change_id: ChangeId) -> Option<ChangeResult> {
        self.changes.get(&change_id).map(|t| t.result.clone())
    }

    pub fn change(&self, change_id: ChangeId) -> Option<SandboxChange> {
        self.changes.get(&change_id).map(|t| t.change.clone())
    }

    /// Restore registry health and version pointers captured in `snapshot`.
    ///
    /// Components registered after the snapshot are left untouched.
    pub fn restore(&self, snapshot: &SystemSnapshot) {
        for handle in &snapshot.handles {
            self.registry.restore(handle);
        }
        for (component, version) in &snapshot.versions {
            if let Err(e) = self.versions.restore_to(component, *version) {
                warn!(component = %component, error = %e, "Could not restore version");
            }
        }
        info!(snapshot_id = %snapshot.id, "Snapshot restored");
    }

    async fn validate(
        &self,
        change: &SandboxChange,
        staged: &serde_json::Value,
        baseline: &FleetMetrics,
    ) -> (Vec<CheckResult>, FleetMetrics, Option<String>) {
        let timeout = self.config.validation_timeout();
        let run = async {
            let mut checks = match change.kind {
                ChangeKind::Config => validation::config_checks(&self.config, &change.payload),
                ChangeKind::Code => validation::code_checks(&self.config, staged),
            };
            checks.extend(
                validation::system_checks(&self.config, self.metrics.as_ref(), &change.target)
                    .await,
            );
            let after = self.metrics.fleet_metrics().await;
            (checks, after)
        };

        match tokio::time::timeout(timeout, AssertUnwindSafe(run).catch_unwind()).await {
            Ok(Ok((checks, after))) => (checks, after, None),
            Ok(Err(_)) => (
                Vec::new(),
                self.metrics_or(baseline).await,
                Some("validation panicked".to_string()),
            ),
            Err(_) => (
                Vec::new(),
                self.metrics_or(baseline).await,
                Some(format!("validation timed out after {}ms", timeout.as_millis())),
            ),
        }
    }

    /// Fresh metrics from the sandbox's source, or `baseline` if the source
    /// stalls or panics again.
    async fn metrics_or(&self, baseline: &FleetMetrics) -> FleetMetrics {
        let fetch = AssertUnwindSafe(self.metrics.fleet_metrics()).catch_unwind();
        match tokio::time::timeout(self.config.validation_timeout(), fetch).await {
            Ok(Ok(metrics)) => metrics,
            _ => {
                warn!("Metrics source unavailable after failed validation; reusing snapshot metrics");
                baseline.clone()
            }
        }
    }

    async fn publish_result(&self, result: &ChangeResult) {
        let (event_type, priority) = if result.success {
            (event_types::SANDBOX_VALIDATED, EventPriority::Medium)
        } else {
            (event_types::SANDBOX_FAILED, EventPriority::High)
        };
        let failed: Vec<&str> = result.failed_checks().map(|c| c.name.as_str()).collect();
        let event = Event::new(event_type, result.target.clone(), priority)
            .with_field("change_id", result.change_id)
            .with_field("kind", result.kind)
            .with_field("failed_checks", failed)
            .with_field("degradation_detected", result.degradation_detected)
            .with_field("rollback_applied", result.rollback_applied);
        self.events.publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bulwark_events::EventPipelineConfig;
    use bulwark_types::PriorityClass;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        sandbox: Sandbox,
        registry: Arc<ComponentRegistry>,
        versions: Arc<VersionStore>,
        events: Arc<EventPipeline>,
    }

    fn fixture(config: SandboxConfig) -> Fixture {
        let registry = Arc::new(ComponentRegistry::default());
        registry.register("gateway", PriorityClass::Essential);
        registry.register("planner", PriorityClass::Essential);
        let versions = Arc::new(VersionStore::default());
        versions.record(
            &ComponentId::new("gateway"),
            json!({ "timeout_ms": 1000, "retries": 3 }),
            Payload::new(),
        );
        let events = Arc::new(EventPipeline::in_memory(EventPipelineConfig::default()));
        let sandbox = Sandbox::new(config, registry.clone(), versions.clone(), events.clone());
        Fixture {
            sandbox,
            registry,
            versions,
            events,
        }
    }

    fn gateway() -> ComponentId {
        ComponentId::new("gateway")
    }

    #[tokio::test]
    async fn valid_config_change_is_staged_not_applied() {
        let f = fixture(SandboxConfig::default());
        let change = SandboxChange::config("gateway", json!({ "timeout_ms": 2500 }));

        let result = f.sandbox.apply_change_in_sandbox(change, None).await.unwrap();

        assert!(result.success);
        assert!(!result.rollback_applied);
        assert_eq!(result.staged_state, json!({ "timeout_ms": 2500, "retries": 3 }));
        assert_eq!(f.sandbox.state(), SandboxState::Idle);
        assert_eq!(f.versions.current_version(&gateway()), Some(1));
        assert_eq!(
            f.versions.current(&gateway()).unwrap().state,
            json!({ "timeout_ms": 1000, "retries": 3 })
        );
        assert_eq!(f.events.pending_by_priority(), [0, 0, 1, 0]);
    }

    #[tokio::test]
    async fn promotion_records_new_version_once() {
        let f = fixture(SandboxConfig::default());
        let change = SandboxChange::config("gateway", json!({ "retries": 5 }));
        let id = change.id;
        f.sandbox.apply_change_in_sandbox(change, None).await.unwrap();

        let version = f.sandbox.apply_to_production(id).await.unwrap();
        assert_eq!(version.version, 2);
        assert_eq!(version.state, json!({ "timeout_ms": 1000, "retries": 5 }));
        assert!(f.sandbox.result(id).unwrap().applied);

        assert!(matches!(
            f.sandbox.apply_to_production(id).await,
            Err(SandboxError::AlreadyApplied(_))
        ));
        assert_eq!(f.versions.current_version(&gateway()), Some(2));
    }

    #[tokio::test]
    async fn failed_change_cannot_be_promoted() {
        let f = fixture(SandboxConfig::default());
        let change = SandboxChange::config("gateway", json!({ "auth": "skip_auth" }));
        let id = change.id;

        let result = f.sandbox.apply_change_in_sandbox(change, None).await.unwrap();
        assert!(!result.success);
        assert_eq!(
            result.failed_checks().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["forbidden_values"]
        );
        assert_eq!(f.sandbox.state(), SandboxState::Error);

        assert!(matches!(
            f.sandbox.apply_to_production(id).await,
            Err(SandboxError::NotApproved(_))
        ));
        assert!(matches!(
            f.sandbox.apply_to_production(ChangeId::generate()).await,
            Err(SandboxError::ChangeNotFound(_))
        ));
        assert_eq!(f.versions.current_version(&gateway()), Some(1));
    }

    #[tokio::test]
    async fn change_is_staged_on_the_snapshot_version() {
        let f = fixture(SandboxConfig::default());
        let snapshot = f.sandbox.create_snapshot().await;
        f.versions.record(
            &gateway(),
            json!({ "timeout_ms": 9999, "retries": 3, "extra": true }),
            Payload::new(),
        );

        let change = SandboxChange::config("gateway", json!({ "retries": 5 }));
        let result = f
            .sandbox
            .apply_change_in_sandbox(change, Some(snapshot.id))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.staged_state, json!({ "timeout_ms": 1000, "retries": 5 }));
    }

    #[tokio::test]
    async fn snapshot_version_no_longer_retained_is_an_error() {
        let registry = Arc::new(ComponentRegistry::default());
        registry.register("gateway", PriorityClass::Essential);
        let versions = Arc::new(VersionStore::new(1));
        versions.record(&gateway(), json!({ "retries": 3 }), Payload::new());
        let events = Arc::new(EventPipeline::in_memory(EventPipelineConfig::default()));
        let sandbox = Sandbox::new(SandboxConfig::default(), registry, versions.clone(), events);

        let snapshot = sandbox.create_snapshot().await;
        versions.record(&gateway(), json!({ "retries": 4 }), Payload::new());

        let change = SandboxChange::config("gateway", json!({ "retries": 5 }));
        assert!(matches!(
            sandbox.apply_change_in_sandbox(change, Some(snapshot.id)).await,
            Err(SandboxError::VersionPruned { version: 1, .. })
        ));
        assert_eq!(sandbox.state(), SandboxState::Idle);
    }

    #[tokio::test]
    async fn oldest_snapshots_are_evicted() {
        let f = fixture(SandboxConfig {
            max_snapshots: 2,
            ..Default::default()
        });
        let first = f.sandbox.create_snapshot().await;
        let second = f.sandbox.create_snapshot().await;
        let third = f.sandbox.create_snapshot().await;

        assert!(f.sandbox.snapshot(first.id).is_none());
        assert!(f.sandbox.snapshot(second.id).is_some());
        assert!(f.sandbox.snapshot(third.id).is_some());

        let change = SandboxChange::config("gateway", json!({ "retries": 5 }));
        assert!(matches!(
            f.sandbox.apply_change_in_sandbox(change, Some(first.id)).await,
            Err(SandboxError::SnapshotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn settled_changes_are_evicted_before_pending_ones() {
        let f = fixture(SandboxConfig {
            max_snapshots: 2,
            max_tracked_changes: 2,
            ..Default::default()
        });
        let pending = SandboxChange::config("gateway", json!({ "retries": 5 }));
        let pending_id = pending.id;
        let rejected = SandboxChange::config("gateway", json!({ "auth": "skip_auth" }));
        let rejected_id = rejected.id;
        let latest = SandboxChange::config("planner", json!({ "depth": 2 }));
        let latest_id = latest.id;

        f.sandbox.apply_change_in_sandbox(pending, None).await.unwrap();
        f.sandbox.apply_change_in_sandbox(rejected, None).await.unwrap();
        f.sandbox.apply_change_in_sandbox(latest, None).await.unwrap();

        assert!(f.sandbox.result(rejected_id).is_none());
        assert!(f.sandbox.result(pending_id).is_some());
        assert!(f.sandbox.result(latest_id).is_some());

        let version = f.sandbox.apply_to_production(pending_id).await.unwrap();
        assert_eq!(version.state, json!({ "timeout_ms": 1000, "retries": 5 }));
    }

    #[tokio::test]
    async fn rollback_restores_snapshot_health() {
        let f = fixture(SandboxConfig::default());
        let snapshot = f.sandbox.create_snapshot().await;

        // fleet degrades between snapshot and validation
        f.registry.mark_unhealthy("gateway", "oom").unwrap();

        let change = SandboxChange::config("gateway", json!({ "retries": 1 }));
        let result = f
            .sandbox
            .apply_change_in_sandbox(change, Some(snapshot.id))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.degradation_detected);
        assert!(result.rollback_applied);
        assert_eq!(f.registry.fleet_metrics(), snapshot.metrics);
        assert!(f.registry.handle("gateway").unwrap().healthy);
    }

    #[tokio::test]
    async fn rollback_can_be_disabled() {
        let f = fixture(SandboxConfig {
            auto_rollback: false,
            ..Default::default()
        });
        f.registry.mark_unhealthy("gateway", "oom").unwrap();
        let change = SandboxChange::config("gateway", json!({ "retries": 1 }));

        let result = f.sandbox.apply_change_in_sandbox(change, None).await.unwrap();
        assert!(!result.success);
        assert!(!result.rollback_applied);
        assert!(!f.registry.handle("gateway").unwrap().healthy);
    }

    #[tokio::test]
    async fn code_change_checks() {
        let f = fixture(SandboxConfig::default());
        let ok = SandboxChange::code("planner", "fn plan() -> u32 { 42 }");
        assert!(f.sandbox.apply_change_in_sandbox(ok, None).await.unwrap().success);

        let broken = SandboxChange::code("planner", "fn plan() -> u32 { 42 ");
        let result = f.sandbox.apply_change_in_sandbox(broken, None).await.unwrap();
        assert!(!result.validation_passed);
        assert_eq!(result.checks[0].name, "syntax");
        assert!(!result.checks[0].passed);
    }

    #[tokio::test]
    async fn unknown_target_or_snapshot_is_an_error() {
        let f = fixture(SandboxConfig::default());
        let change = SandboxChange::config("ghost", json!({ "a": 1 }));
        assert!(matches!(
            f.sandbox.apply_change_in_sandbox(change, None).await,
            Err(SandboxError::ComponentNotFound(_))
        ));

        let change = SandboxChange::config("gateway", json!({ "a": 1 }));
        assert!(matches!(
            f.sandbox
                .apply_change_in_sandbox(change, Some(SnapshotId::generate()))
                .await,
            Err(SandboxError::SnapshotNotFound(_))
        ));
        assert_eq!(f.sandbox.state(), SandboxState::Idle);
    }

    #[tokio::test]
    async fn skipping_validation_still_stages() {
        let f = fixture(SandboxConfig {
            require_validation: false,
            ..Default::default()
        });
        let change = SandboxChange::config("gateway", json!({ "mode": "allow_all" }));
        let result = f.sandbox.apply_change_in_sandbox(change, None).await.unwrap();
        assert!(result.success);
        assert!(result.checks.is_empty());
    }

    struct StalledMetrics;

    #[async_trait]
    impl MetricsProvider for StalledMetrics {
        async fn fleet_metrics(&self) -> FleetMetrics {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            FleetMetrics::default()
        }

        async fn component_healthy(&self, _component: &ComponentId) -> Option<bool> {
            Some(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn validation_timeout_fails_the_change() {
        let registry = Arc::new(ComponentRegistry::default());
        registry.register("gateway", PriorityClass::Essential);
        let events = Arc::new(EventPipeline::in_memory(EventPipelineConfig::default()));
        let sandbox = Sandbox::new(
            SandboxConfig::default(),
            registry,
            Arc::new(VersionStore::default()),
            events,
        );
        let snapshot = sandbox.create_snapshot().await;
        let sandbox = sandbox.with_metrics(Arc::new(StalledMetrics));

        let change = SandboxChange::config("gateway", json!({ "retries": 2 }));
        let result = sandbox
            .apply_change_in_sandbox(change, Some(snapshot.id))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(result.rollback_applied);
        assert_eq!(result.metrics_after, snapshot.metrics);
    }

    /// Reports its own fleet figures but crashes on per-component health.
    struct CrashingHealth;

    #[async_trait]
    impl MetricsProvider for CrashingHealth {
        async fn fleet_metrics(&self) -> FleetMetrics {
            FleetMetrics::from_counts(10, 7)
        }

        async fn component_healthy(&self, _component: &ComponentId) -> Option<bool> {
            panic!("health check crashed")
        }
    }

    #[tokio::test]
    async fn panicked_validation_reports_the_sandbox_metrics_source() {
        let f = fixture(SandboxConfig::default());
        let sandbox = Sandbox::new(
            SandboxConfig::default(),
            f.registry.clone(),
            f.versions.clone(),
            f.events.clone(),
        )
        .with_metrics(Arc::new(CrashingHealth));

        let change = SandboxChange::config("gateway", json!({ "retries": 2 }));
        let result = sandbox.apply_change_in_sandbox(change, None).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("validation panicked"));
        assert_eq!(result.metrics_after, FleetMetrics::from_counts(10, 7));
        assert_ne!(result.metrics_after, f.registry.fleet_metrics());
    }

    struct RejectingApplier;

    #[async_trait]
    impl ProductionApplier for RejectingApplier {
        async fn apply(&self, _change: &SandboxChange, _state: &serde_json::Value) -> SandboxResult<()> {
            Err(SandboxError::Production("deployer offline".into()))
        }
    }

    #[tokio::test]
    async fn applier_failure_leaves_version_unchanged() {
        let f = fixture(SandboxConfig::default());
        let sandbox = Sandbox::new(
            SandboxConfig::default(),
            f.registry.clone(),
            f.versions.clone(),
            f.events.clone(),
        )
        .with_applier(Arc::new(RejectingApplier));

        let change = SandboxChange::config("gateway", json!({ "retries": 9 }));
        let id = change.id;
        sandbox.apply_change_in_sandbox(change, None).await.unwrap();

        assert!(matches!(
            sandbox.apply_to_production(id).await,
            Err(SandboxError::Production(_))
        ));
        assert!(!sandbox.result(id).unwrap().applied);
        assert_eq!(f.versions.current_version(&gateway()), Some(1));
        assert_eq!(sandbox.state(), SandboxState::Error);
    }
}
