//! Remediation error types

use bulwark_registry::RegistryError;
use bulwark_types::ComponentId;
use thiserror::Error;

use crate::strategy::RepairStrategy;

/// Remediation errors
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Component not registered: {0}")]
    ComponentNotFound(ComponentId),

    #[error("Not enough history to roll back {component}: {available} snapshot(s)")]
    InsufficientHistory {
        component: ComponentId,
        available: usize,
    },

    #[error("Version {version} not found for {component}")]
    VersionNotFound { component: ComponentId, version: u64 },

    #[error("Repair strategy {strategy} failed: {reason}")]
    StrategyFailed {
        strategy: RepairStrategy,
        reason: String,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type for remediation operations
pub type RemediationResult<T> = std::result::Result<T, RemediationError>;
