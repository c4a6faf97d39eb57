//! Containment-backed isolation for the repair ladder

use std::sync::Arc;

use async_trait::async_trait;
use bulwark_containment::{ContainmentLevel, ContainmentSystem};
use bulwark_remediation::{Isolator, RemediationResult};
use bulwark_types::ComponentId;

/// Lets the `isolate` repair rung cut a component off through the
/// containment system.
pub struct ContainmentIsolator {
    containment: Arc<ContainmentSystem>,
    level: ContainmentLevel,
}

impl ContainmentIsolator {
    pub fn new(containment: Arc<ContainmentSystem>) -> Self {
        Self {
            containment,
            level: ContainmentLevel::Full,
        }
    }

    pub fn with_level(mut self, level: ContainmentLevel) -> Self {
        self.level = level;
        self
    }
}

#[async_trait]
impl Isolator for ContainmentIsolator {
    async fn isolate(&self, component: &ComponentId, reason: &str) -> RemediationResult<()> {
        self.containment
            .isolate(component, self.level, format!("repair: {reason}"))
            .await;
        Ok(())
    }
}
