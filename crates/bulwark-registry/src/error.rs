//! Registry error types

use bulwark_types::ComponentId;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Component not found: {0}")]
    ComponentNotFound(ComponentId),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Probe timed out after {timeout_ms}ms")]
    ProbeTimeout { timeout_ms: u64 },

    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
