//! Main ControlPlane implementation
//!
//! The ControlPlane owns one instance of every subsystem and is the entry
//! point for guarded actions. Authorization gates each action, the action's
//! circuit breaker bounds it, and a tripped breaker isolates the component.

use std::future::Future;
use std::sync::Arc;

use bulwark_authz::AuthorizationEngine;
use bulwark_containment::{ContainmentLevel, ContainmentSystem, ForensicAnalyzer};
use bulwark_events::{DispatcherHandle, EventPipeline};
use bulwark_registry::{ComponentRegistry, ShutdownReport};
use bulwark_remediation::{AutoRepair, RegistryRepairExecutor, RepairExecutor, VersionStore};
use bulwark_resilience::{BreakerError, BreakerRegistry, CircuitState};
use bulwark_sandbox::{MetricsProvider, ProductionApplier, Sandbox};
use bulwark_types::{event_types, ComponentId, Event, EventPriority};
use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};

use crate::config::BulwarkConfig;
use crate::error::{ControlPlaneError, ControlPlaneResult};
use crate::isolator::ContainmentIsolator;
use crate::monitor::{FleetMonitor, MonitorHandle};
use crate::sinks::AuditSinks;

struct Running {
    dispatcher: DispatcherHandle,
    monitor: Option<MonitorHandle>,
}

/// Unified control plane for the fleet
pub struct ControlPlane {
    config: BulwarkConfig,
    registry: Arc<ComponentRegistry>,
    events: Arc<EventPipeline>,
    breakers: Arc<BreakerRegistry>,
    authz: Arc<AuthorizationEngine>,
    containment: Arc<ContainmentSystem>,
    versions: Arc<VersionStore>,
    repair: Arc<AutoRepair>,
    sandbox: Arc<Sandbox>,
    monitor: Arc<FleetMonitor>,
    running: Mutex<Option<Running>>,
}

impl ControlPlane {
    pub fn builder(config: BulwarkConfig) -> ControlPlaneBuilder {
        ControlPlaneBuilder::new(config)
    }

    pub fn config(&self) -> &BulwarkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventPipeline> {
        &self.events
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn authz(&self) -> &Arc<AuthorizationEngine> {
        &self.authz
    }

    pub fn containment(&self) -> &Arc<ContainmentSystem> {
        &self.containment
    }

    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }

    pub fn repair(&self) -> &Arc<AutoRepair> {
        &self.repair
    }

    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    pub fn monitor(&self) -> &Arc<FleetMonitor> {
        &self.monitor
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the event dispatcher and, when enabled, the fleet monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> ControlPlaneResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ControlPlaneError::AlreadyRunning);
        }

        let dispatcher = self.events.spawn();
        let monitor = self
            .config
            .monitor
            .enabled
            .then(|| self.monitor.spawn());
        *running = Some(Running {
            dispatcher,
            monitor,
        });

        info!(
            components = self.registry.len(),
            monitor = self.config.monitor.enabled,
            "Control plane started"
        );
        Ok(())
    }

    /// Stop background tasks, deliver anything still queued, then shut
    /// components down in reverse startup order.
    pub async fn shutdown(&self) -> ControlPlaneResult<ShutdownReport> {
        let mut first_error = None;
        let running = self.running.lock().take();
        if let Some(running) = running {
            if let Some(monitor) = running.monitor {
                if let Err(e) = monitor.stop().await {
                    error!(error = %e, "Fleet monitor did not stop cleanly");
                    first_error.get_or_insert(e);
                }
            }
            if let Err(e) = running.dispatcher.stop().await {
                error!(error = %e, "Event dispatcher did not stop cleanly");
                first_error.get_or_insert(e.into());
            }
        }

        let flushed = self.events.drain().await;
        let report = self.registry.shutdown_all().await;
        info!(
            flushed,
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            "Control plane stopped"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Run `f` as `action` on behalf of `component`.
    ///
    /// 1. authorization must allow the action at the current trust
    /// 2. the component must be registered, healthy and not contained
    ///    above PARTIAL
    /// 3. `f` runs through the breaker keyed by component and action
    ///
    /// The outcome feeds the action's trust score. When this failure opens
    /// the breaker the component is isolated at PARTIAL and a
    /// `breaker.opened` event is published.
    #[instrument(skip(self, component, f), fields(component = %component))]
    pub async fn execute_guarded<F, Fut, T, E>(
        &self,
        component: &ComponentId,
        action: &str,
        f: F,
    ) -> ControlPlaneResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let decision = self.authz.authorize(action).await;
        if !decision.allowed {
            warn!(reason = %decision.reason, trust = decision.trust, "Action denied");
            return Err(ControlPlaneError::NotAuthorized {
                action: action.to_string(),
                reason: decision.reason,
            });
        }

        let healthy = self.registry.get(component.as_str()).is_some();
        if !self.containment.admits_calls(component, healthy) {
            let contained = self
                .containment
                .record(component)
                .is_some_and(|r| r.level.refuses_calls());
            return Err(if contained {
                ControlPlaneError::Contained(component.clone())
            } else {
                ControlPlaneError::Unavailable(component.clone())
            });
        }

        let key = format!("{component}/{action}");
        let breaker = self.breakers.breaker(&key);

        let failure = match breaker.call(f).await {
            Ok(value) => {
                self.authz.record_decision(action, true);
                return Ok(value);
            }
            Err(BreakerError::Open { key }) => {
                return Err(ControlPlaneError::CircuitOpen { key });
            }
            Err(e) => e.to_string(),
        };

        let trust = self.authz.record_decision(action, false);
        warn!(error = %failure, trust, "Guarded action failed");

        // Only an admitted call can fail, so an open breaker now means this
        // failure tripped it.
        if breaker.state() == CircuitState::Open {
            self.containment
                .isolate(
                    component,
                    ContainmentLevel::Partial,
                    format!("circuit opened for {action}"),
                )
                .await;
            let event = Event::new(
                event_types::BREAKER_OPENED,
                component.clone(),
                EventPriority::High,
            )
            .with_field("action", action)
            .with_field("key", &key)
            .with_field("error", &failure);
            self.events.publish(event).await;
        }

        Err(ControlPlaneError::ActionFailed {
            action: action.to_string(),
            reason: failure,
        })
    }
}

/// Builder wiring the subsystems together.
pub struct ControlPlaneBuilder {
    config: BulwarkConfig,
    sinks: Option<AuditSinks>,
    registry: Option<Arc<ComponentRegistry>>,
    executor: Option<Arc<dyn RepairExecutor>>,
    applier: Option<Arc<dyn ProductionApplier>>,
    metrics: Option<Arc<dyn MetricsProvider>>,
}

impl ControlPlaneBuilder {
    pub fn new(config: BulwarkConfig) -> Self {
        Self {
            config,
            sinks: None,
            registry: None,
            executor: None,
            applier: None,
            metrics: None,
        }
    }

    /// Use these sinks instead of the configured log directory.
    pub fn with_sinks(mut self, sinks: AuditSinks) -> Self {
        self.sinks = Some(sinks);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the registry-backed repair executor.
    pub fn with_repair_executor(mut self, executor: Arc<dyn RepairExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_applier(mut self, applier: Arc<dyn ProductionApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn build(self) -> ControlPlaneResult<ControlPlane> {
        let config = self.config;
        let sinks = match (self.sinks, &config.logs.directory) {
            (Some(sinks), _) => sinks,
            (None, Some(dir)) => AuditSinks::in_dir(dir).await?,
            (None, None) => AuditSinks::null(),
        };

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ComponentRegistry::new(config.registry.clone())));
        let events = Arc::new(EventPipeline::new(config.events.clone(), sinks.events));
        let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
        let authz = Arc::new(AuthorizationEngine::new(
            config.authorization.clone(),
            sinks.decisions,
        )?);

        let analyzer = ForensicAnalyzer::new(config.forensics.clone())?;
        let containment = Arc::new(ContainmentSystem::new(
            config.containment.clone(),
            analyzer,
            registry.clone(),
            events.clone(),
            sinks.containment,
            sinks.forensics,
        ));

        let versions = Arc::new(VersionStore::new(config.repair.version_capacity));
        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(
                RegistryRepairExecutor::new(
                    registry.clone(),
                    versions.clone(),
                    config.repair.restart_delay(),
                )
                .with_isolator(Arc::new(ContainmentIsolator::new(containment.clone()))),
            )
        });
        let repair = Arc::new(AutoRepair::new(
            config.repair.clone(),
            registry.clone(),
            executor,
            events.clone(),
            sinks.repairs,
        ));

        let mut sandbox = Sandbox::new(
            config.sandbox.clone(),
            registry.clone(),
            versions.clone(),
            events.clone(),
        );
        if let Some(metrics) = self.metrics {
            sandbox = sandbox.with_metrics(metrics);
        }
        if let Some(applier) = self.applier {
            sandbox = sandbox.with_applier(applier);
        }

        let monitor = Arc::new(FleetMonitor::new(
            config.monitor.interval(),
            registry.clone(),
            events.clone(),
            repair.clone(),
            containment.clone(),
        ));

        Ok(ControlPlane {
            config,
            registry,
            events,
            breakers,
            authz,
            containment,
            versions,
            repair,
            sandbox: Arc::new(sandbox),
            monitor,
            running: Mutex::new(None),
        })
    }
}
