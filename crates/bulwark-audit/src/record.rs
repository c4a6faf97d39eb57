//! Flat audit records

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One audit log line.
///
/// Always carries `timestamp` (RFC 3339, UTC) and `record` (the record kind);
/// everything else is supplied by the subsystem writing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRecord {
    fields: Map<String, Value>,
}

impl AuditRecord {
    /// Start a record of the given kind, stamped with the current time.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        fields.insert("record".to_string(), Value::String(kind.into()));
        Self { fields }
    }

    /// Add a field. Values that fail to serialize are recorded as `null`.
    pub fn field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.into(), value);
        self
    }

    /// Record kind.
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("record").and_then(Value::as_str)
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields, including `timestamp` and `record`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Render as a single JSON line (without the trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.fields)
    }
}
