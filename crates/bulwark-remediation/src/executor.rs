//! Executors that carry out a chosen repair strategy

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulwark_registry::ComponentRegistry;
use bulwark_types::ComponentId;
use tracing::{debug, info};

use crate::error::{RemediationError, RemediationResult};
use crate::strategy::RepairStrategy;
use crate::versions::VersionStore;

/// Carries out repair strategies.
#[async_trait]
pub trait RepairExecutor: Send + Sync {
    async fn execute(
        &self,
        component: &ComponentId,
        strategy: RepairStrategy,
    ) -> RemediationResult<()>;
}

/// Capability to cut a component off from the fleet.
#[async_trait]
pub trait Isolator: Send + Sync {
    async fn isolate(&self, component: &ComponentId, reason: &str) -> RemediationResult<()>;
}

/// Repairs components through registry state and the version store.
///
/// Restart flips the health flag off and back on after `restart_delay`; it
/// does not restart a process.
pub struct RegistryRepairExecutor {
    registry: Arc<ComponentRegistry>,
    versions: Arc<VersionStore>,
    isolator: Option<Arc<dyn Isolator>>,
    restart_delay: Duration,
}

impl RegistryRepairExecutor {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        versions: Arc<VersionStore>,
        restart_delay: Duration,
    ) -> Self {
        Self {
            registry,
            versions,
            isolator: None,
            restart_delay,
        }
    }

    pub fn with_isolator(mut self, isolator: Arc<dyn Isolator>) -> Self {
        self.isolator = Some(isolator);
        self
    }
}

#[async_trait]
impl RepairExecutor for RegistryRepairExecutor {
    async fn execute(
        &self,
        component: &ComponentId,
        strategy: RepairStrategy,
    ) -> RemediationResult<()> {
        let name = component.as_str();
        debug!(component = %component, strategy = %strategy, "Executing repair");

        match strategy {
            RepairStrategy::Restart => {
                self.registry.mark_unhealthy(name, "restarting")?;
                tokio::time::sleep(self.restart_delay).await;
                self.registry.mark_healthy(name)?;
            }
            RepairStrategy::Reset => {
                self.registry.reset(name)?;
            }
            RepairStrategy::Rollback => {
                let restored = self.versions.rollback(component, None)?;
                self.registry.reset(name)?;
                info!(component = %component, version = restored.version, "Rollback repair applied");
            }
            RepairStrategy::Isolate => {
                let isolator =
                    self.isolator
                        .as_ref()
                        .ok_or_else(|| RemediationError::StrategyFailed {
                            strategy,
                            reason: "no isolator configured".into(),
                        })?;
                isolator.isolate(component, "automatic repair").await?;
            }
            RepairStrategy::Replace => {
                self.registry.replace(name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_types::{Payload, PriorityClass};

    fn setup() -> (Arc<ComponentRegistry>, Arc<VersionStore>, RegistryRepairExecutor) {
        let registry = Arc::new(ComponentRegistry::default());
        let versions = Arc::new(VersionStore::default());
        let executor = RegistryRepairExecutor::new(
            registry.clone(),
            versions.clone(),
            Duration::from_millis(10),
        );
        (registry, versions, executor)
    }

    #[tokio::test(start_paused = true)]
    async fn restart_leaves_component_healthy() {
        let (registry, _, executor) = setup();
        registry.register("planner", PriorityClass::Essential);
        registry.mark_unhealthy("planner", "crashed").unwrap();

        executor
            .execute(&ComponentId::new("planner"), RepairStrategy::Restart)
            .await
            .unwrap();
        let handle = registry.handle("planner").unwrap();
        assert!(handle.healthy);
        assert_eq!(handle.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn rollback_without_history_fails() {
        let (registry, versions, executor) = setup();
        let id = ComponentId::new("state-sync");
        registry.register(id.clone(), PriorityClass::Essential);

        let err = executor
            .execute(&id, RepairStrategy::Rollback)
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::InsufficientHistory { .. }));

        versions.record(&id, serde_json::json!(1), Payload::new());
        versions.record(&id, serde_json::json!(2), Payload::new());
        executor.execute(&id, RepairStrategy::Rollback).await.unwrap();
        assert_eq!(versions.current_version(&id), Some(1));
    }

    #[tokio::test]
    async fn isolate_needs_an_isolator() {
        let (registry, _, executor) = setup();
        registry.register("reporter", PriorityClass::Optional);
        let err = executor
            .execute(&ComponentId::new("reporter"), RepairStrategy::Isolate)
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::StrategyFailed { .. }));
    }

    #[tokio::test]
    async fn replace_bumps_generation() {
        let (registry, _, executor) = setup();
        registry.register("reporter", PriorityClass::Optional);
        executor
            .execute(&ComponentId::new("reporter"), RepairStrategy::Replace)
            .await
            .unwrap();
        assert_eq!(registry.handle("reporter").unwrap().generation, 1);
    }

    #[tokio::test]
    async fn unknown_component_is_a_registry_error() {
        let (_, _, executor) = setup();
        let err = executor
            .execute(&ComponentId::new("ghost"), RepairStrategy::Reset)
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::Registry(_)));
    }
}
