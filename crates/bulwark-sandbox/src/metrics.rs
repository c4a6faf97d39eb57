//! Source of monitoring metrics for before/after comparison

use async_trait::async_trait;
use bulwark_registry::ComponentRegistry;
use bulwark_types::{ComponentId, FleetMetrics};

/// Supplies live fleet metrics to the sandbox.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn fleet_metrics(&self) -> FleetMetrics;

    /// Health of one component; `None` if unknown.
    async fn component_healthy(&self, component: &ComponentId) -> Option<bool>;
}

#[async_trait]
impl MetricsProvider for ComponentRegistry {
    async fn fleet_metrics(&self) -> FleetMetrics {
        ComponentRegistry::fleet_metrics(self)
    }

    async fn component_healthy(&self, component: &ComponentId) -> Option<bool> {
        self.handle(component.as_str()).map(|h| h.healthy)
    }
}
