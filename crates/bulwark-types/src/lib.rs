//! Bulwark Types - Core types for the fleet safety control plane
//!
//! Bulwark keeps a fleet of semi-autonomous components safe while they act
//! with escalating self-directed authority. Every component crate builds on
//! the vocabulary defined here.
//!
//! ## Key Concepts
//!
//! - **ComponentId**: name of an independently-managed unit in the fleet
//! - **PriorityClass**: startup/shutdown class of a component
//! - **Event**: immutable notification carried by the event pipeline
//! - **FleetMetrics**: point-in-time health figures used for regression checks

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod events;
pub mod ids;
pub mod metrics;
pub mod priority;

// Re-export main types
pub use events::{event_types, Event, Payload};
pub use ids::{ChangeId, ComponentId, SnapshotId, SpanId, TraceId};
pub use metrics::FleetMetrics;
pub use priority::{EventPriority, PriorityClass};
