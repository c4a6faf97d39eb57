//! Sandbox error types
//!
//! Validation failures are not errors; they are recorded in
//! [`crate::ChangeResult`]. These variants cover misuse by the caller.

use bulwark_types::{ChangeId, ComponentId, SnapshotId};
use thiserror::Error;

/// Sandbox errors
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Change not found: {0}")]
    ChangeNotFound(ChangeId),

    #[error("Change {0} did not pass validation and cannot be promoted")]
    NotApproved(ChangeId),

    #[error("Change {0} was already promoted")]
    AlreadyApplied(ChangeId),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    #[error("Version {version} of {component} captured by the snapshot is no longer retained")]
    VersionPruned { component: ComponentId, version: u64 },

    #[error("Component not registered: {0}")]
    ComponentNotFound(ComponentId),

    #[error("Production apply failed: {0}")]
    Production(String),
}

/// Result type for sandbox operations
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
