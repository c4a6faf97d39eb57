//! Containment error types

use bulwark_types::ComponentId;
use thiserror::Error;

/// Containment errors
///
/// A refused release is not an error; see [`crate::ReleaseOutcome`].
#[derive(Debug, Error)]
pub enum ContainmentError {
    #[error("Component is not contained: {0}")]
    NotContained(ComponentId),

    #[error("Invalid forensic pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for containment operations
pub type ContainmentResult<T> = std::result::Result<T, ContainmentError>;
