//! Telemetry record and its line encoding.

use crate::RelayResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of telemetry produced at a point in time.
///
/// The relay never looks inside `fields`; they are flattened next to the
/// producer id and timestamp so a buffered line reads
/// `{"agent_id":"agent-001","timestamp":"...","temperature":23.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Producer identifier.
    pub agent_id: String,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Payload fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no payload fields.
    pub fn new(agent_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp,
            fields: Map::new(),
        }
    }

    /// Add a payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize to a single line (no trailing newline).
    ///
    /// JSON escapes control characters inside strings, so the result never
    /// contains a raw `\n` and is safe to use as a buffer line.
    pub fn to_line(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one buffer line.
    pub fn from_line(line: &str) -> RelayResult<Self> {
        Ok(serde_json::from_str(line.trim_end_matches('\r'))?)
    }
}
