//! Bulwark Registry - tracks which components exist and how healthy they are
//!
//! - [`ComponentRegistry`]: owns one [`AgentHandle`] per registered component
//! - [`HealthProbe`] / [`Lifecycle`]: capabilities adapters may implement
//! - [`Capabilities`]: what an adapter exposes; a missing probe is the
//!   [`HealthCapability::Unprobed`] variant, never a runtime attribute check
//!
//! Unprobed components are treated as healthy by every health cycle.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod capability;
pub mod config;
pub mod error;
pub mod handle;
pub mod registry;

// Re-exports
pub use capability::{Capabilities, HealthCapability, HealthProbe, Lifecycle};
pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use handle::AgentHandle;
pub use registry::{ComponentRegistry, ShutdownReport};
