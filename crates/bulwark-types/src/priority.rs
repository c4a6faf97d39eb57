//! Priority classes for components and events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority class of a registered component.
///
/// Components start up in declaration order (critical first) and are torn
/// down in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityClass {
    /// Fleet cannot operate without it
    Critical,
    /// Needed for normal operation
    Essential,
    /// Nice to have; first to be sacrificed
    Optional,
}

impl PriorityClass {
    /// Position in startup order; lower starts first.
    pub fn startup_rank(&self) -> u8 {
        match self {
            PriorityClass::Critical => 0,
            PriorityClass::Essential => 1,
            PriorityClass::Optional => 2,
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityClass::Critical => write!(f, "critical"),
            PriorityClass::Essential => write!(f, "essential"),
            PriorityClass::Optional => write!(f, "optional"),
        }
    }
}

/// Delivery priority of an event.
///
/// Variants are ordered from most to least urgent, so `Critical < Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl EventPriority {
    /// All priorities in dispatch order.
    pub const ALL: [EventPriority; 4] = [
        EventPriority::Critical,
        EventPriority::High,
        EventPriority::Medium,
        EventPriority::Low,
    ];

    /// Index of this priority's dispatch queue.
    pub fn queue_index(&self) -> usize {
        match self {
            EventPriority::Critical => 0,
            EventPriority::High => 1,
            EventPriority::Medium => 2,
            EventPriority::Low => 3,
        }
    }

    /// Critical events are never debounced.
    pub fn bypasses_debounce(&self) -> bool {
        matches!(self, EventPriority::Critical)
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPriority::Critical => write!(f, "critical"),
            EventPriority::High => write!(f, "high"),
            EventPriority::Medium => write!(f, "medium"),
            EventPriority::Low => write!(f, "low"),
        }
    }
}
