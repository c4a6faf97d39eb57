//! Bulwark Control - the fleet safety control plane facade
//!
//! Wires the registry, event pipeline, breakers, authorization, containment,
//! remediation and sandbox into a single [`ControlPlane`].
//!
//! ## Control flow
//!
//! ```text
//! FleetMonitor --health--> events + AutoRepair --isolate--> Containment
//! execute_guarded --> Authorization --> CircuitBreaker --open--> Containment
//! Sandbox --promote--> VersionStore (shared with AutoRepair rollback)
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod control_plane;
pub mod error;
pub mod isolator;
pub mod monitor;
pub mod sinks;
pub mod telemetry;

// Re-exports
pub use config::{BulwarkConfig, LogConfig, MonitorConfig};
pub use control_plane::{ControlPlane, ControlPlaneBuilder};
pub use error::{ControlPlaneError, ControlPlaneResult};
pub use isolator::ContainmentIsolator;
pub use monitor::{FleetMonitor, MonitorHandle, MonitorReport};
pub use sinks::AuditSinks;
pub use telemetry::init_tracing;
