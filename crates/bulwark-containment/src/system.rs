//! Containment system

use std::collections::BTreeSet;
use std::sync::Arc;

use bulwark_audit::{AuditRecord, AuditSink};
use bulwark_events::EventPipeline;
use bulwark_registry::ComponentRegistry;
use bulwark_types::{event_types, ComponentId, Event, EventPriority, PriorityClass};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::ContainmentConfig;
use crate::error::{ContainmentError, ContainmentResult};
use crate::forensics::{Evidence, ForensicAnalyzer, ForensicReport};
use crate::level::{ContainmentLevel, Permission, ResourceCaps};
use crate::record::ContainmentRecord;

/// Result of a release attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReleaseOutcome {
    /// Containment lifted
    Released { report: ForensicReport },
    /// Forensics do not clear the component; only the attempt counter moved
    Refused { attempts: u32 },
}

impl ReleaseOutcome {
    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released { .. })
    }
}

/// Owns every containment record.
pub struct ContainmentSystem {
    config: ContainmentConfig,
    analyzer: ForensicAnalyzer,
    registry: Arc<ComponentRegistry>,
    events: Arc<EventPipeline>,
    audit: Arc<dyn AuditSink>,
    forensic_log: Arc<dyn AuditSink>,
    records: DashMap<ComponentId, ContainmentRecord>,
}

impl ContainmentSystem {
    pub fn new(
        config: ContainmentConfig,
        analyzer: ForensicAnalyzer,
        registry: Arc<ComponentRegistry>,
        events: Arc<EventPipeline>,
        audit: Arc<dyn AuditSink>,
        forensic_log: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            analyzer,
            registry,
            events,
            audit,
            forensic_log,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ContainmentConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &ForensicAnalyzer {
        &self.analyzer
    }

    /// Isolate `component` at `level`.
    ///
    /// Re-isolating updates the record in place, keeping its evidence,
    /// forensic report and attempt counter. A quarantined component is never
    /// downgraded by a weaker isolation.
    #[instrument(skip(self, component, reason), fields(component = %component))]
    pub async fn isolate(
        &self,
        component: &ComponentId,
        level: ContainmentLevel,
        reason: impl Into<String>,
    ) -> ContainmentRecord {
        let reason = reason.into();

        if let Some(existing) = self.records.get(component) {
            if existing.level == ContainmentLevel::Quarantine && level < ContainmentLevel::Quarantine
            {
                warn!(requested = %level, "Component is quarantined; keeping quarantine");
                return existing.clone();
            }
        }

        let record = self.upsert(component, level, &reason, None);
        warn!(level = %level, reason = %reason, blocked = record.blocked_peers.len(), "Component isolated");

        self.announce(
            event_types::COMPONENT_ISOLATED,
            "isolation",
            &record,
        )
        .await;
        record
    }

    /// Quarantine `component`: block every peer, revoke every permission,
    /// throttle capacity and attach a forensic report on `evidence`.
    #[instrument(skip(self, component, reason, evidence), fields(component = %component))]
    pub async fn quarantine(
        &self,
        component: &ComponentId,
        reason: impl Into<String>,
        evidence: Evidence,
    ) -> ContainmentRecord {
        let reason = reason.into();
        let report = self.analyzer.analyze(component, &evidence);
        self.log_report(&report).await;

        let record = self.upsert(
            component,
            ContainmentLevel::Quarantine,
            &reason,
            Some((evidence, report)),
        );
        warn!(
            reason = %reason,
            severity = ?record.forensic_report.as_ref().map(|r| r.severity),
            "Component quarantined"
        );

        self.announce(
            event_types::COMPONENT_QUARANTINED,
            "quarantine",
            &record,
        )
        .await;
        record
    }

    /// Re-analyze a contained component with new evidence, replacing the
    /// attached report.
    #[instrument(skip(self, component, evidence), fields(component = %component))]
    pub async fn update_forensics(
        &self,
        component: &ComponentId,
        evidence: Evidence,
    ) -> ContainmentResult<ForensicReport> {
        if !self.records.contains_key(component) {
            return Err(ContainmentError::NotContained(component.clone()));
        }

        let report = self.analyzer.analyze(component, &evidence);
        {
            let mut record = self
                .records
                .get_mut(component)
                .ok_or_else(|| ContainmentError::NotContained(component.clone()))?;
            record.evidence = evidence;
            record.forensic_report = Some(report.clone());
            record.updated_at = Utc::now();
        }
        info!(
            severity = %report.severity,
            safe_to_release = report.safe_to_release,
            "Forensic report updated"
        );
        self.log_report(&report).await;
        Ok(report)
    }

    /// Lift containment if the latest forensic report allows it.
    ///
    /// A refused attempt increments the attempt counter and changes nothing
    /// else.
    #[instrument(skip(self, component), fields(component = %component))]
    pub async fn release(&self, component: &ComponentId) -> ContainmentResult<ReleaseOutcome> {
        // Check and removal happen under one shard lock so a concurrent
        // forensic update cannot land between them.
        let released = self
            .records
            .remove_if(component, |_, r| r.safe_to_release())
            .and_then(|(_, record)| {
                let report = record.forensic_report.clone()?;
                Some((record, report))
            });

        let Some((record, report)) = released else {
            let mut record = self
                .records
                .get_mut(component)
                .ok_or_else(|| ContainmentError::NotContained(component.clone()))?;
            record.release_attempts = record.release_attempts.saturating_add(1);
            let attempts = record.release_attempts;
            warn!(attempts, "Release refused: forensics do not clear component");
            return Ok(ReleaseOutcome::Refused { attempts });
        };
        info!(level = %record.level, "Containment released");

        let audit = AuditRecord::new("release")
            .field("component", component)
            .field("level", record.level)
            .field("release_attempts", record.release_attempts)
            .field("severity", report.severity)
            .field("evidence_digest", &report.evidence_digest);
        if let Err(e) = self.audit.append(audit).await {
            warn!(error = %e, "Failed to write containment audit record");
        }

        let event = Event::new(
            event_types::COMPONENT_RELEASED,
            component.clone(),
            EventPriority::High,
        )
        .with_field("level", record.level)
        .with_field("severity", report.severity);
        self.events.publish(event).await;

        Ok(ReleaseOutcome::Released { report })
    }

    /// Whether `from` and `to` may exchange messages. Consults both
    /// components' records on every call.
    pub fn can_communicate(&self, from: &ComponentId, to: &ComponentId) -> bool {
        let blocked_by = |owner: &ComponentId, peer: &ComponentId| {
            self.records
                .get(owner)
                .map(|r| r.blocks(peer, self.registry.priority_of(peer.as_str())))
                .unwrap_or(false)
        };
        !(blocked_by(from, to) || blocked_by(to, from))
    }

    /// Whether calls into `component` are admitted. Containment above
    /// PARTIAL refuses calls whatever the reported health.
    pub fn admits_calls(&self, component: &ComponentId, reported_healthy: bool) -> bool {
        match self.records.get(component) {
            Some(record) if record.level.refuses_calls() => false,
            _ => reported_healthy,
        }
    }

    pub fn is_permitted(&self, component: &ComponentId, permission: Permission) -> bool {
        self.records
            .get(component)
            .map(|r| r.permits(permission))
            .unwrap_or(true)
    }

    pub fn resource_caps(&self, component: &ComponentId) -> ResourceCaps {
        self.records
            .get(component)
            .map(|r| r.caps)
            .unwrap_or_else(ResourceCaps::unrestricted)
    }

    pub fn is_contained(&self, component: &ComponentId) -> bool {
        self.records.contains_key(component)
    }

    pub fn record(&self, component: &ComponentId) -> Option<ContainmentRecord> {
        self.records.get(component).map(|r| r.clone())
    }

    /// Every record, sorted by component.
    pub fn records(&self) -> Vec<ContainmentRecord> {
        let mut all: Vec<ContainmentRecord> = self.records.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| a.component.cmp(&b.component));
        all
    }

    /// Create or update the record for `component`.
    fn upsert(
        &self,
        component: &ComponentId,
        level: ContainmentLevel,
        reason: &str,
        forensics: Option<(Evidence, ForensicReport)>,
    ) -> ContainmentRecord {
        let blocked_peers = self.blocked_peers(component, level);
        let revoked_permissions = level.revoked_permissions();
        let caps = ResourceCaps::for_level(level, self.config.capacity_for(level));
        let now = Utc::now();

        let mut entry = self
            .records
            .entry(component.clone())
            .or_insert_with(|| ContainmentRecord {
                component: component.clone(),
                level,
                reason: reason.to_string(),
                evidence: Evidence::new(),
                blocked_peers: BTreeSet::new(),
                revoked_permissions: BTreeSet::new(),
                caps,
                forensic_report: None,
                release_attempts: 0,
                contained_at: now,
                updated_at: now,
            });

        entry.level = level;
        entry.reason = reason.to_string();
        entry.blocked_peers = blocked_peers;
        entry.revoked_permissions = revoked_permissions;
        entry.caps = caps;
        entry.updated_at = now;
        if let Some((evidence, report)) = forensics {
            entry.evidence = evidence;
            entry.forensic_report = Some(report);
        }
        entry.clone()
    }

    fn blocked_peers(&self, component: &ComponentId, level: ContainmentLevel) -> BTreeSet<ComponentId> {
        self.registry
            .members()
            .into_iter()
            .filter(|peer| &peer.name != component)
            .filter(|peer| level.blocks_all_peers() || peer.priority == PriorityClass::Critical)
            .map(|peer| peer.name)
            .collect()
    }

    /// Publish the CRITICAL event and write the audit record for an entry
    /// into containment.
    async fn announce(&self, event_type: &str, audit_kind: &str, record: &ContainmentRecord) {
        let audit = AuditRecord::new(audit_kind)
            .field("component", &record.component)
            .field("level", record.level)
            .field("reason", &record.reason)
            .field("blocked_peers", &record.blocked_peers)
            .field("revoked_permissions", &record.revoked_permissions)
            .field("caps", record.caps)
            .field("evidence", &record.evidence)
            .field(
                "severity",
                record.forensic_report.as_ref().map(|r| r.severity),
            );
        if let Err(e) = self.audit.append(audit).await {
            warn!(component = %record.component, error = %e, "Failed to write containment audit record");
        }

        let event = Event::new(event_type, record.component.clone(), EventPriority::Critical)
            .with_field("level", record.level)
            .with_field("reason", &record.reason)
            .with_field("blocked_peers", record.blocked_peers.len());
        self.events.publish(event).await;
    }

    async fn log_report(&self, report: &ForensicReport) {
        let entry = AuditRecord::new("forensic_report")
            .field("component", &report.component)
            .field("category", report.category)
            .field("severity", report.severity)
            .field("matched_patterns", &report.matched_patterns)
            .field("confidence", report.confidence)
            .field("safe_to_release", report.safe_to_release)
            .field("recommendations", &report.recommendations)
            .field("evidence_digest", &report.evidence_digest);
        if let Err(e) = self.forensic_log.append(entry).await {
            warn!(component = %report.component, error = %e, "Failed to write forensic log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_audit::{FailingAuditSink, MemoryAuditSink};
    use bulwark_events::EventPipelineConfig;
    use serde_json::json;

    struct Fixture {
        system: ContainmentSystem,
        registry: Arc<ComponentRegistry>,
        events: Arc<EventPipeline>,
        audit: Arc<MemoryAuditSink>,
        forensic_log: Arc<MemoryAuditSink>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ComponentRegistry::default());
        registry.register("security", PriorityClass::Critical);
        registry.register("scheduler", PriorityClass::Critical);
        registry.register("planner", PriorityClass::Essential);
        registry.register("reporter", PriorityClass::Optional);
        registry.register("suspect", PriorityClass::Essential);

        let events = Arc::new(EventPipeline::in_memory(EventPipelineConfig::default()));
        let audit = Arc::new(MemoryAuditSink::new());
        let forensic_log = Arc::new(MemoryAuditSink::new());
        let system = ContainmentSystem::new(
            ContainmentConfig::default(),
            ForensicAnalyzer::with_defaults().unwrap(),
            registry.clone(),
            events.clone(),
            audit.clone(),
            forensic_log.clone(),
        );
        Fixture {
            system,
            registry,
            events,
            audit,
            forensic_log,
        }
    }

    fn id(name: &str) -> ComponentId {
        ComponentId::new(name)
    }

    fn hostile_evidence() -> Evidence {
        [(
            "alerts".to_string(),
            json!("CRITICAL rootkit: hidden process running as root, syscall hook"),
        )]
        .into_iter()
        .collect()
    }

    fn benign_evidence() -> Evidence {
        [("logs".to_string(), json!("restart loop after config reload"))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn partial_blocks_only_critical_peers() {
        let f = fixture();
        f.system
            .isolate(&id("suspect"), ContainmentLevel::Partial, "flaky")
            .await;

        assert!(!f.system.can_communicate(&id("suspect"), &id("security")));
        assert!(!f.system.can_communicate(&id("scheduler"), &id("suspect")));
        assert!(f.system.can_communicate(&id("suspect"), &id("planner")));
        assert!(f.system.can_communicate(&id("reporter"), &id("suspect")));
        assert!(f.system.can_communicate(&id("planner"), &id("security")));
    }

    #[tokio::test]
    async fn full_and_emergency_block_every_peer() {
        for level in [ContainmentLevel::Full, ContainmentLevel::Emergency] {
            let f = fixture();
            f.system.isolate(&id("suspect"), level, "compromised").await;
            f.registry.register("late-joiner", PriorityClass::Optional);

            for peer in ["security", "scheduler", "planner", "reporter", "late-joiner"] {
                assert!(!f.system.can_communicate(&id("suspect"), &id(peer)));
                assert!(!f.system.can_communicate(&id(peer), &id("suspect")));
            }
        }
    }

    #[tokio::test]
    async fn isolation_publishes_critical_event_and_audits() {
        let f = fixture();
        f.system
            .isolate(&id("suspect"), ContainmentLevel::Full, "breaker opened")
            .await;

        assert_eq!(f.events.pending_by_priority()[0], 1);
        let records = f.audit.records_of("isolation");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("level"), Some(&json!("FULL")));
    }

    #[tokio::test]
    async fn re_isolation_updates_in_place() {
        let f = fixture();
        let first = f
            .system
            .isolate(&id("suspect"), ContainmentLevel::Partial, "first")
            .await;
        let second = f
            .system
            .isolate(&id("suspect"), ContainmentLevel::Full, "second")
            .await;

        assert_eq!(f.system.records().len(), 1);
        assert_eq!(second.contained_at, first.contained_at);
        assert_eq!(second.level, ContainmentLevel::Full);
        assert_eq!(second.reason, "second");
        assert!(second.caps.cpu_fraction < first.caps.cpu_fraction);
        assert!(!f.system.is_permitted(&id("suspect"), Permission::WriteFiles));
        assert!(f.system.is_permitted(&id("planner"), Permission::WriteFiles));
    }

    #[tokio::test]
    async fn quarantine_overrides_reported_health() {
        let f = fixture();
        assert!(f.system.admits_calls(&id("suspect"), true));

        f.system
            .quarantine(&id("suspect"), "rootkit suspected", hostile_evidence())
            .await;

        assert!(!f.system.admits_calls(&id("suspect"), true));
        let caps = f.system.resource_caps(&id("suspect"));
        assert!((caps.cpu_fraction - 0.1).abs() < f64::EPSILON);
        assert_eq!(f.forensic_log.records_of("forensic_report").len(), 1);
        assert_eq!(f.audit.records_of("quarantine").len(), 1);
    }

    #[tokio::test]
    async fn refused_releases_only_increment_counter() {
        let f = fixture();
        f.system
            .quarantine(&id("suspect"), "rootkit suspected", hostile_evidence())
            .await;
        let before = f.system.record(&id("suspect")).unwrap();
        let audit_before = f.audit.record_count();
        let pending_before = f.events.pending();

        for n in 1..=4u32 {
            let outcome = f.system.release(&id("suspect")).await.unwrap();
            assert_eq!(outcome, ReleaseOutcome::Refused { attempts: n });
        }

        let after = f.system.record(&id("suspect")).unwrap();
        assert_eq!(after.release_attempts, before.release_attempts + 4);
        assert_eq!(
            ContainmentRecord {
                release_attempts: before.release_attempts,
                ..after
            },
            before
        );
        assert_eq!(f.audit.record_count(), audit_before);
        assert_eq!(f.events.pending(), pending_before);
    }

    #[tokio::test]
    async fn release_after_clean_forensics() {
        let f = fixture();
        f.system
            .quarantine(&id("suspect"), "suspicious", hostile_evidence())
            .await;

        let report = f
            .system
            .update_forensics(&id("suspect"), benign_evidence())
            .await
            .unwrap();
        assert!(report.safe_to_release);

        let outcome = f.system.release(&id("suspect")).await.unwrap();
        assert!(outcome.is_released());
        assert!(!f.system.is_contained(&id("suspect")));
        assert!(f.system.can_communicate(&id("suspect"), &id("security")));
        assert_eq!(f.audit.records_of("release").len(), 1);
        // quarantine (critical) + release (high)
        assert_eq!(f.events.pending_by_priority(), [1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn escalation_after_clearance_blocks_release() {
        let f = fixture();
        f.system
            .quarantine(&id("suspect"), "suspicious", hostile_evidence())
            .await;
        f.system
            .update_forensics(&id("suspect"), benign_evidence())
            .await
            .unwrap();
        f.system
            .update_forensics(&id("suspect"), hostile_evidence())
            .await
            .unwrap();

        let outcome = f.system.release(&id("suspect")).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::Refused { attempts: 1 });
        assert!(f.system.is_contained(&id("suspect")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_escalation_and_release_never_both_succeed() {
        for _ in 0..50 {
            let Fixture { system, .. } = fixture();
            let system = Arc::new(system);
            system
                .quarantine(&id("suspect"), "suspicious", hostile_evidence())
                .await;
            system
                .update_forensics(&id("suspect"), benign_evidence())
                .await
                .unwrap();

            let releaser = {
                let system = system.clone();
                tokio::spawn(async move { system.release(&id("suspect")).await })
            };
            let escalator = {
                let system = system.clone();
                tokio::spawn(
                    async move { system.update_forensics(&id("suspect"), hostile_evidence()).await },
                )
            };
            let released = releaser.await.unwrap().unwrap().is_released();
            let escalated = escalator.await.unwrap().is_ok();

            assert_ne!(released, escalated);
            assert_eq!(system.is_contained(&id("suspect")), escalated);
        }
    }

    #[tokio::test]
    async fn isolation_without_forensics_is_never_released() {
        let f = fixture();
        f.system
            .isolate(&id("suspect"), ContainmentLevel::Partial, "flaky")
            .await;
        let outcome = f.system.release(&id("suspect")).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::Refused { attempts: 1 });
    }

    #[tokio::test]
    async fn quarantine_is_not_downgraded_by_isolate() {
        let f = fixture();
        f.system
            .quarantine(&id("suspect"), "rootkit", hostile_evidence())
            .await;
        let record = f
            .system
            .isolate(&id("suspect"), ContainmentLevel::Partial, "retry")
            .await;
        assert_eq!(record.level, ContainmentLevel::Quarantine);
    }

    #[tokio::test]
    async fn release_of_uncontained_component_is_an_error() {
        let f = fixture();
        assert!(matches!(
            f.system.release(&id("planner")).await,
            Err(ContainmentError::NotContained(_))
        ));
        assert!(f
            .system
            .update_forensics(&id("planner"), benign_evidence())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn audit_failure_does_not_prevent_containment() {
        let registry = Arc::new(ComponentRegistry::default());
        let events = Arc::new(EventPipeline::in_memory(EventPipelineConfig::default()));
        let system = ContainmentSystem::new(
            ContainmentConfig::default(),
            ForensicAnalyzer::with_defaults().unwrap(),
            registry,
            events.clone(),
            Arc::new(FailingAuditSink),
            Arc::new(FailingAuditSink),
        );

        system
            .quarantine(&id("x"), "test", hostile_evidence())
            .await;
        assert!(system.is_contained(&id("x")));
        assert_eq!(events.pending(), 1);
    }
}
