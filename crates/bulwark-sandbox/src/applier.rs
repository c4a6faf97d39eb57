//! Seam for pushing a promoted change to the real deployment

use async_trait::async_trait;
use tracing::debug;

use crate::change::SandboxChange;
use crate::error::SandboxResult;

/// Performs the real, non-isolated mutation for a promoted change.
#[async_trait]
pub trait ProductionApplier: Send + Sync {
    async fn apply(&self, change: &SandboxChange, state: &serde_json::Value) -> SandboxResult<()>;
}

/// Applier for deployments where recording the new version is the whole
/// mutation.
pub struct NullApplier;

#[async_trait]
impl ProductionApplier for NullApplier {
    async fn apply(&self, change: &SandboxChange, _state: &serde_json::Value) -> SandboxResult<()> {
        debug!(change_id = %change.id, target = %change.target, "No external deployer configured");
        Ok(())
    }
}
