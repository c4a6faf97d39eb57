//! Capabilities a component adapter may expose to the registry

use crate::error::RegistryResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Health probe implemented by an adapter.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Return `Ok(true)` when healthy. Errors count as unhealthy.
    async fn check_health(&self) -> RegistryResult<bool>;
}

/// Orderly teardown implemented by an adapter.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn shutdown(&self) -> RegistryResult<()>;
}

/// Whether a component can be probed.
#[derive(Clone, Default)]
pub enum HealthCapability {
    /// No probe; health cycles treat the component as healthy
    #[default]
    Unprobed,
    /// Probe invoked on every health cycle
    Probed(Arc<dyn HealthProbe>),
}

impl fmt::Debug for HealthCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCapability::Unprobed => write!(f, "Unprobed"),
            HealthCapability::Probed(_) => write!(f, "Probed"),
        }
    }
}

/// Everything an adapter exposes.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub health: HealthCapability,
    pub lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.health = HealthCapability::Probed(probe);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("health", &self.health)
            .field("lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}
