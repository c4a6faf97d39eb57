//! # Bulwark Audit
//!
//! Per-subsystem audit logs consumed by external reporting tooling.
//!
//! Every record is one flat JSON object on its own line: a `timestamp`, the
//! `record` kind, and the fields of the action being recorded. There is no
//! schema versioning and no cross-record chaining; the files are meant to be
//! tailed and correlated offline (events carry their `trace_id`).
//!
//! ## Sinks
//!
//! - [`FileAuditSink`]: append-only file, one line per record
//! - [`MemoryAuditSink`]: in-memory sink for tests and embedding
//! - [`NullAuditSink`]: discards everything
//! - [`FailingAuditSink`]: always errors, used to exercise failure isolation

#![deny(unsafe_code)]

pub mod error;
pub mod record;
pub mod sink;

pub use error::{AuditError, AuditResult};
pub use record::AuditRecord;
pub use sink::{AuditSink, FailingAuditSink, FileAuditSink, MemoryAuditSink, NullAuditSink};
