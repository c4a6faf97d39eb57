//! Per-subsystem audit log wiring

use std::path::Path;
use std::sync::Arc;

use bulwark_audit::{AuditSink, FileAuditSink, NullAuditSink};

use crate::error::ControlPlaneResult;

/// One sink per subsystem log.
#[derive(Clone)]
pub struct AuditSinks {
    /// Every published event with its trace id
    pub events: Arc<dyn AuditSink>,
    /// Authorization decisions
    pub decisions: Arc<dyn AuditSink>,
    /// Isolation, quarantine and release actions
    pub containment: Arc<dyn AuditSink>,
    /// Forensic reports
    pub forensics: Arc<dyn AuditSink>,
    /// Repair attempts
    pub repairs: Arc<dyn AuditSink>,
}

impl AuditSinks {
    /// Discard everything.
    pub fn null() -> Self {
        Self::shared(Arc::new(NullAuditSink))
    }

    /// Route every subsystem to the same sink.
    pub fn shared(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            events: sink.clone(),
            decisions: sink.clone(),
            containment: sink.clone(),
            forensics: sink.clone(),
            repairs: sink,
        }
    }

    /// Append-only NDJSON files under `dir`, one per subsystem.
    pub async fn in_dir(dir: &Path) -> ControlPlaneResult<Self> {
        let open = |name: &str| FileAuditSink::new(dir.join(name));
        Ok(Self {
            events: Arc::new(open("events.ndjson").await?),
            decisions: Arc::new(open("decisions.ndjson").await?),
            containment: Arc::new(open("containment.ndjson").await?),
            forensics: Arc::new(open("forensics.ndjson").await?),
            repairs: Arc::new(open("repairs.ndjson").await?),
        })
    }
}
