//! Bulwark Sandbox - stage a change, prove it harmless, then promote it
//!
//! ```text
//! IDLE -> CLONING -> TESTING -> VALIDATING -> IDLE   (passed)
//!                                          -> ERROR  (failed, optionally rolled back)
//! IDLE -> APPLYING -> IDLE                           (promotion)
//! ```
//!
//! A change is applied only to a staged copy of the target's version as
//! captured in the snapshot. Promotion through [`Sandbox::apply_to_production`] is the one
//! path that touches live state, and it is refused unless the staged result
//! passed validation without degradation.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod applier;
pub mod change;
pub mod config;
pub mod error;
pub mod metrics;
pub mod sandbox;
pub mod snapshot;
mod validation;

// Re-exports
pub use applier::{NullApplier, ProductionApplier};
pub use change::{ChangeKind, ChangeResult, CheckResult, SandboxChange};
pub use config::SandboxConfig;
pub use error::{SandboxError, SandboxResult};
pub use metrics::MetricsProvider;
pub use sandbox::{Sandbox, SandboxState};
pub use snapshot::SystemSnapshot;
