//! Bulwark Events - the bus every control-plane component publishes on
//!
//! Events flow through four strict priority queues (critical, high, medium,
//! low). Non-critical repeats of the same `(type, source)` pair are dropped
//! inside the debounce window. Every accepted event is appended to the audit
//! sink with its trace id before the dispatcher delivers it.
//!
//! A single dispatcher drains the queues in priority order and calls handlers
//! one at a time; a failing or panicking handler is logged and skipped.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod pipeline;

// Re-exports
pub use config::EventPipelineConfig;
pub use dispatcher::DispatcherHandle;
pub use error::{EventError, EventResult};
pub use handler::{EventHandler, FnHandler, SubscriptionId, WILDCARD};
pub use pipeline::{EventPipeline, PipelineStats, PublishOutcome};
