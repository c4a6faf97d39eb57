//! End-to-end scenarios through the control plane facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bulwark_audit::MemoryAuditSink;
use bulwark_authz::DecisionReason;
use bulwark_containment::ContainmentLevel;
use bulwark_control::{AuditSinks, BulwarkConfig, ControlPlane, ControlPlaneError};
use bulwark_events::{FnHandler, WILDCARD};
use bulwark_registry::{Capabilities, HealthProbe, Lifecycle, RegistryResult};
use bulwark_remediation::{RepairOutcome, RepairStrategy};
use bulwark_sandbox::SandboxChange;
use bulwark_types::{event_types, ComponentId, Event, EventPriority, PriorityClass};
use parking_lot::Mutex;
use serde_json::json;

struct DownProbe;

#[async_trait]
impl HealthProbe for DownProbe {
    async fn check_health(&self) -> RegistryResult<bool> {
        Ok(false)
    }
}

struct ShutdownLog {
    name: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Lifecycle for ShutdownLog {
    async fn shutdown(&self) -> RegistryResult<()> {
        self.order.lock().push(self.name);
        Ok(())
    }
}

async fn plane(config: BulwarkConfig) -> ControlPlane {
    let plane = ControlPlane::builder(config)
        .with_sinks(AuditSinks::null())
        .build()
        .await
        .unwrap();
    plane.registry().register("security", PriorityClass::Critical);
    plane.registry().register("planner", PriorityClass::Essential);
    plane
}

fn id(name: &str) -> ComponentId {
    ComponentId::new(name)
}

#[tokio::test]
async fn guarded_success_builds_trust() {
    let plane = plane(BulwarkConfig::default()).await;

    let value = plane
        .execute_guarded(&id("planner"), "read_logs", || async { Ok::<_, String>(42) })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(plane.authz().trust_score("read_logs"), 1.0);
    assert!(!plane.containment().is_contained(&id("planner")));
}

#[tokio::test]
async fn repeated_failure_opens_breaker_and_isolates() {
    let mut config = BulwarkConfig::default();
    config.breaker.failure_threshold = 2;
    let plane = plane(config).await;
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    for _ in 0..2 {
        let err = plane
            .execute_guarded(&id("planner"), "read_logs", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("disk error")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::ActionFailed { .. }));
    }

    let record = plane.containment().record(&id("planner")).unwrap();
    assert_eq!(record.level, ContainmentLevel::Partial);
    // isolation (CRITICAL) and breaker.opened (HIGH)
    assert_eq!(plane.events().pending_by_priority(), [1, 1, 0, 0]);

    let err = plane
        .execute_guarded(&id("planner"), "read_logs", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::CircuitOpen { .. }));
    assert!(err.is_refusal());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(plane.authz().trust_score("read_logs"), 0.0);
}

#[tokio::test]
async fn authorization_gates_before_running() {
    let plane = plane(BulwarkConfig::default()).await;
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let run = move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(())
    };

    let cases = [
        ("modify_code", DecisionReason::ApprovalRequired),
        ("delete_data", DecisionReason::Blocked),
        ("launch_rockets", DecisionReason::NotDefined),
    ];
    for (action, expected) in cases {
        match plane.execute_guarded(&id("planner"), action, run).await {
            Err(ControlPlaneError::NotAuthorized { reason, .. }) => assert_eq!(reason, expected),
            other => panic!("{action}: unexpected {other:?}"),
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    plane.authz().set_emergency(true);
    plane
        .execute_guarded(&id("planner"), "restart_component", run)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn contained_component_refuses_calls() {
    let plane = plane(BulwarkConfig::default()).await;
    plane
        .containment()
        .isolate(&id("planner"), ContainmentLevel::Full, "suspicious egress")
        .await;

    let err = plane
        .execute_guarded(&id("planner"), "read_logs", || async { Ok::<_, String>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::Contained(_)));
    assert!(!plane
        .containment()
        .can_communicate(&id("planner"), &id("security")));
}

#[tokio::test]
async fn unhealthy_or_unknown_component_refuses_calls() {
    let plane = plane(BulwarkConfig::default()).await;
    plane
        .registry()
        .mark_unhealthy("planner", "deadlock")
        .unwrap();
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let run = move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>("ran")
    };

    for name in ["planner", "ghost"] {
        let err = plane
            .execute_guarded(&id(name), "read_logs", run)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::Unavailable(_)), "{name}: {err:?}");
        assert!(err.is_refusal());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    plane.registry().mark_healthy("planner").unwrap();
    assert_eq!(
        plane.execute_guarded(&id("planner"), "read_logs", run).await.unwrap(),
        "ran"
    );
}

#[tokio::test(start_paused = true)]
async fn monitor_sweeps_feed_repair() {
    let plane = plane(BulwarkConfig::default()).await;
    plane
        .registry()
        .register_with(
            "code",
            PriorityClass::Essential,
            Capabilities::none().with_probe(Arc::new(DownProbe)),
        );

    for expected in 1..=2 {
        let report = plane.monitor().run_once().await;
        assert_eq!(report.unhealthy, vec![id("code")]);
        assert!(matches!(
            report.repairs[0].1,
            RepairOutcome::BelowThreshold { failures, .. } if failures == expected
        ));
    }

    let report = plane.monitor().run_once().await;
    assert_eq!(report.checked, 3);
    let RepairOutcome::Repaired(attempt) = &report.repairs[0].1 else {
        panic!("expected repair, got {:?}", report.repairs);
    };
    assert_eq!(attempt.strategy, RepairStrategy::Restart);
    assert!(plane.registry().handle("code").unwrap().healthy);

    // repeated component.unhealthy events are debounced; one repair.completed
    assert_eq!(plane.events().pending_by_priority(), [0, 1, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn monitor_leaves_quarantined_components_alone() {
    let plane = plane(BulwarkConfig::default()).await;
    plane.registry().register_with(
        "code",
        PriorityClass::Essential,
        Capabilities::none().with_probe(Arc::new(DownProbe)),
    );
    plane
        .containment()
        .quarantine(&id("code"), "rootkit", Default::default())
        .await;

    let report = plane.monitor().run_once().await;
    assert!(report.unhealthy.is_empty());
    assert_eq!(plane.repair().failure_count(&id("code")), 0);
}

#[tokio::test]
async fn start_and_shutdown_lifecycle() {
    let mut config = BulwarkConfig::default();
    config.monitor.enabled = false;
    let plane = ControlPlane::builder(config)
        .with_sinks(AuditSinks::null())
        .build()
        .await
        .unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in [
        ("security", PriorityClass::Critical),
        ("reporter", PriorityClass::Optional),
        ("planner", PriorityClass::Essential),
    ] {
        plane.registry().register_with(
            name,
            priority,
            Capabilities::none().with_lifecycle(Arc::new(ShutdownLog {
                name,
                order: order.clone(),
            })),
        );
    }

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    plane.events().subscribe(
        WILDCARD,
        Arc::new(FnHandler::new(move |_event: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })),
    );

    plane.start().unwrap();
    assert!(matches!(plane.start(), Err(ControlPlaneError::AlreadyRunning)));

    plane
        .events()
        .publish(Event::new("disk_full", "node-7", EventPriority::Medium))
        .await;

    let report = plane.shutdown().await.unwrap();
    assert!(!plane.is_running());
    assert!(report.is_clean());
    assert_eq!(*order.lock(), vec!["reporter", "planner", "security"]);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sandbox_promotions_share_the_repair_version_store() {
    let plane = plane(BulwarkConfig::default()).await;
    let sandbox = plane.sandbox();

    for retries in [3, 5] {
        let change = SandboxChange::config("planner", json!({ "retries": retries }));
        let change_id = change.id;
        let result = sandbox.apply_change_in_sandbox(change, None).await.unwrap();
        assert!(result.success);
        sandbox.apply_to_production(change_id).await.unwrap();
    }

    assert_eq!(plane.versions().current_version(&id("planner")), Some(2));
    let restored = plane.versions().rollback(&id("planner"), None).unwrap();
    assert_eq!(restored.state, json!({ "retries": 3 }));
}

#[tokio::test]
async fn sandbox_rollback_restores_pre_change_health() {
    let plane = plane(BulwarkConfig::default()).await;
    let snapshot = plane.sandbox().create_snapshot().await;
    plane
        .registry()
        .mark_unhealthy("planner", "deadlock")
        .unwrap();

    let change = SandboxChange::code("planner", "fn plan() { }");
    let result = plane
        .sandbox()
        .apply_change_in_sandbox(change, Some(snapshot.id))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.rollback_applied);
    assert_eq!(plane.registry().fleet_metrics(), snapshot.metrics);
}

#[tokio::test]
async fn decision_and_event_logs_use_memory_sinks() {
    let decisions = Arc::new(MemoryAuditSink::new());
    let events = Arc::new(MemoryAuditSink::new());
    let sinks = AuditSinks {
        decisions: decisions.clone(),
        events: events.clone(),
        ..AuditSinks::null()
    };
    let plane = ControlPlane::builder(BulwarkConfig::default())
        .with_sinks(sinks)
        .build()
        .await
        .unwrap();
    plane.registry().register("planner", PriorityClass::Essential);

    plane
        .execute_guarded(&id("planner"), "read_logs", || async { Ok::<_, String>(()) })
        .await
        .unwrap();
    plane
        .containment()
        .isolate(&id("planner"), ContainmentLevel::Partial, "flaky")
        .await;

    let decision = &decisions.records_of("decision")[0];
    assert_eq!(decision.get("action"), Some(&json!("read_logs")));
    assert_eq!(decision.get("allowed"), Some(&json!(true)));

    let logged = events.records_of("event");
    assert_eq!(logged.len(), 1);
    assert_eq!(
        logged[0].get("event_type"),
        Some(&json!(event_types::COMPONENT_ISOLATED))
    );
}

#[tokio::test]
async fn log_directory_produces_ndjson_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = BulwarkConfig::from_toml_str(&format!(
        "[logs]\ndirectory = {:?}\n",
        dir.path().display().to_string()
    ))
    .unwrap();
    let plane = ControlPlane::builder(config).build().await.unwrap();

    plane.authz().authorize("modify_code").await;

    let text = std::fs::read_to_string(dir.path().join("decisions.ndjson")).unwrap();
    let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(line["record"], "decision");
    assert_eq!(line["reason"], "approval_required");
}
