//! Event type carried by the event pipeline
//!
//! Events are immutable once published. The pipeline fills in the trace and
//! span ids when a publisher leaves them empty.

use crate::{ComponentId, EventPriority, SpanId, TraceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form event payload.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// Well-known event types published by the control plane itself.
pub mod event_types {
    pub const COMPONENT_ISOLATED: &str = "component.isolated";
    pub const COMPONENT_QUARANTINED: &str = "component.quarantined";
    pub const COMPONENT_RELEASED: &str = "component.released";
    pub const COMPONENT_UNHEALTHY: &str = "component.unhealthy";
    pub const REPAIR_COMPLETED: &str = "repair.completed";
    pub const REPAIR_FAILED: &str = "repair.failed";
    pub const SANDBOX_VALIDATED: &str = "sandbox.validated";
    pub const SANDBOX_FAILED: &str = "sandbox.failed";
    pub const SANDBOX_PROMOTED: &str = "sandbox.promoted";
    pub const BREAKER_OPENED: &str = "breaker.opened";
}

/// A published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `component.isolated`
    pub event_type: String,

    /// Component that produced the event
    pub source: ComponentId,

    /// Delivery priority
    pub priority: EventPriority,

    /// Event-specific data
    pub payload: Payload,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Correlation id, assigned on publish if absent
    pub trace_id: Option<TraceId>,

    /// Hop id, assigned on publish if absent
    pub span_id: Option<SpanId>,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<ComponentId>,
        priority: EventPriority,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            priority,
            payload: Payload::new(),
            timestamp: Utc::now(),
            trace_id: None,
            span_id: None,
        }
    }

    /// Add a payload field. Values that fail to serialize are skipped.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.payload.insert(key.into(), v);
        }
        self
    }

    /// Continue an existing trace.
    pub fn with_trace(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Debounce key: events with the same type and source are repeats.
    pub fn debounce_key(&self) -> (String, ComponentId) {
        (self.event_type.clone(), self.source.clone())
    }

    /// Fill in trace and span ids that the publisher left empty.
    pub fn ensure_trace(&mut self) -> TraceId {
        let trace_id = self.trace_id.get_or_insert_with(TraceId::generate).clone();
        if self.span_id.is_none() {
            self.span_id = Some(SpanId::generate());
        }
        trace_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_trace_keeps_existing_trace() {
        let trace = TraceId::new("abc");
        let mut event = Event::new("disk_full", "node-7", EventPriority::Medium)
            .with_trace(trace.clone());
        assert_eq!(event.ensure_trace(), trace);
        assert!(event.span_id.is_some());
    }

    #[test]
    fn ensure_trace_assigns_missing_ids() {
        let mut event = Event::new("disk_full", "node-7", EventPriority::Medium);
        let trace = event.ensure_trace();
        assert_eq!(event.trace_id, Some(trace));
        assert!(event.span_id.is_some());
    }

    #[test]
    fn payload_fields() {
        let event = Event::new("repair.completed", "code", EventPriority::Medium)
            .with_field("strategy", "restart")
            .with_field("attempt", 2);
        assert_eq!(event.payload["strategy"], "restart");
        assert_eq!(event.payload["attempt"], 2);
    }
}
