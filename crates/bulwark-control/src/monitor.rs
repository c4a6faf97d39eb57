//! Periodic fleet health sweep feeding remediation

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bulwark_containment::{ContainmentLevel, ContainmentSystem};
use bulwark_events::EventPipeline;
use bulwark_registry::ComponentRegistry;
use bulwark_remediation::{AutoRepair, RepairOutcome};
use bulwark_types::{event_types, ComponentId, Event, EventPriority};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{ControlPlaneError, ControlPlaneResult};

/// What one sweep saw and did.
#[derive(Debug, Default)]
pub struct MonitorReport {
    pub checked: usize,
    pub unhealthy: Vec<ComponentId>,
    pub repairs: Vec<(ComponentId, RepairOutcome)>,
}

/// Probes the fleet on an interval, announces unhealthy components and
/// hands them to [`AutoRepair`].
pub struct FleetMonitor {
    interval: Duration,
    registry: Arc<ComponentRegistry>,
    events: Arc<EventPipeline>,
    repair: Arc<AutoRepair>,
    containment: Arc<ContainmentSystem>,
}

impl FleetMonitor {
    pub fn new(
        interval: Duration,
        registry: Arc<ComponentRegistry>,
        events: Arc<EventPipeline>,
        repair: Arc<AutoRepair>,
        containment: Arc<ContainmentSystem>,
    ) -> Self {
        Self {
            interval,
            registry,
            events,
            repair,
            containment,
        }
    }

    /// One sweep. Quarantined components are left to containment.
    pub async fn run_once(&self) -> MonitorReport {
        let results = self.registry.health_check_all().await;
        let mut report = MonitorReport {
            checked: results.len(),
            ..Default::default()
        };

        let mut unhealthy: Vec<ComponentId> = results
            .into_iter()
            .filter_map(|(id, healthy)| (!healthy).then_some(id))
            .collect();
        unhealthy.sort();

        for component in unhealthy {
            let quarantined = self
                .containment
                .record(&component)
                .is_some_and(|r| r.level == ContainmentLevel::Quarantine);
            if quarantined {
                debug!(component = %component, "Skipping quarantined component");
                continue;
            }

            let reason = self
                .registry
                .handle(component.as_str())
                .and_then(|h| h.last_error)
                .unwrap_or_else(|| "health check failed".to_string());

            let event = Event::new(
                event_types::COMPONENT_UNHEALTHY,
                component.clone(),
                EventPriority::High,
            )
            .with_field("error", &reason);
            self.events.publish(event).await;

            match self.repair.detect_and_repair(&component, &reason).await {
                Ok(outcome) => report.repairs.push((component.clone(), outcome)),
                Err(e) => error!(component = %component, error = %e, "Repair cycle failed"),
            }
            report.unhealthy.push(component);
        }

        if !report.unhealthy.is_empty() {
            warn!(
                checked = report.checked,
                unhealthy = report.unhealthy.len(),
                "Fleet sweep found unhealthy components"
            );
        }
        report
    }

    /// Sweep every interval until `shutdown` flips. A sweep that panics is
    /// logged and the loop carries on.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Fleet monitor started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if AssertUnwindSafe(self.run_once()).catch_unwind().await.is_err() {
                        error!("Fleet sweep panicked");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Fleet monitor stopped");
    }

    pub fn spawn(self: &Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let task = tokio::spawn(async move { monitor.run(shutdown_rx).await });
        MonitorHandle::new(shutdown_tx, task)
    }
}

/// Owns a running monitor task.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) fn new(shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { shutdown, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal cancellation and wait for the sweep in flight to finish.
    pub async fn stop(self) -> ControlPlaneResult<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| ControlPlaneError::Task(e.to_string()))
    }
}
