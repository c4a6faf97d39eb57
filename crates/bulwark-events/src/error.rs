//! Event pipeline error types

use thiserror::Error;

/// Event pipeline errors
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Dispatcher task failed: {0}")]
    Dispatcher(String),
}

/// Result type for event pipeline operations
pub type EventResult<T> = std::result::Result<T, EventError>;
