//! Core domain types for trackline
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **TrackingRecord** | One immutable tracked event with its identity/session context |
//! | **Envelope** | A tenant identifier plus one record; the unit of single-event delivery |
//! | **Batch** | An ordered group of envelopes delivered in one request |
//! | **Auto queue** | Events waiting for health resolution or the next scheduled flush |
//! | **Manual batch** | Events the caller grouped explicitly for deferred delivery |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================
// Records
// ============================================

/// An immutable tracked event.
///
/// Created once per tracked event by the
/// [`EventFactory`](crate::pipeline::EventFactory) and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// Event name
    pub event_name: String,
    /// JSON-encoded payload; absent when the payload was empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Persistent per-install identifier
    pub identity: String,
    /// Per-process-lifetime session identifier
    pub session_id: String,
    /// Platform tag
    pub platform: String,
    /// Host application version
    pub app_version: String,
    /// JSON-encoded custom data configured at the time of tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
    /// When the event was tracked (ISO-8601, UTC)
    pub timestamp: DateTime<Utc>,
}

/// One record plus the tenant it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub tenant_id: String,
    pub event: TrackingRecord,
}

/// An ordered group of envelopes.
///
/// Insertion order is preserved on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub events: Vec<Envelope>,
}

impl Batch {
    pub fn new(events: Vec<Envelope>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ============================================
// Payloads
// ============================================

/// Event payload supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No payload
    #[default]
    None,
    /// Structured key-value payload, encoded as a JSON object
    Fields(serde_json::Map<String, serde_json::Value>),
    /// Raw string payload, wrapped as `{"value": "..."}`
    Text(String),
}

impl Payload {
    /// Returns true if encoding this payload yields no `value` field
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::None => true,
            Payload::Fields(fields) => fields.is_empty(),
            Payload::Text(text) => text.is_empty(),
        }
    }

    /// Encode the payload as a JSON string, or `None` when empty.
    pub fn encode(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let value = match self {
            Payload::None => return None,
            Payload::Fields(fields) => serde_json::Value::Object(fields.clone()),
            Payload::Text(text) => serde_json::json!({ "value": text }),
        };
        Some(value.to_string())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Payload {
    fn from(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Payload::Fields(fields)
    }
}

impl From<HashMap<String, serde_json::Value>> for Payload {
    fn from(fields: HashMap<String, serde_json::Value>) -> Self {
        Payload::Fields(fields.into_iter().collect())
    }
}

impl From<serde_json::Value> for Payload {
    /// Objects become fields, strings become text, null becomes no payload.
    /// Any other JSON value is carried as its text form.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Payload::None,
            serde_json::Value::Object(fields) => Payload::Fields(fields),
            serde_json::Value::String(text) => Payload::Text(text),
            other => Payload::Text(other.to_string()),
        }
    }
}

// ============================================
// State
// ============================================

/// Resolved reachability of the delivery endpoint.
///
/// Moves from `Unchecked` to `Alive` or `Dead` exactly once per pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Unchecked,
    Alive,
    Dead,
}

impl HealthState {
    /// Whether the startup probe has completed
    pub fn is_checked(&self) -> bool {
        !matches!(self, HealthState::Unchecked)
    }

    /// Whether the endpoint answered the probe. False until the probe completes.
    pub fn is_alive(&self) -> bool {
        matches!(self, HealthState::Alive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unchecked => "unchecked",
            HealthState::Alive => "alive",
            HealthState::Dead => "dead",
        }
    }
}

/// Pipeline lifecycle. Transitions only move forward; `Closed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Uninitialized,
    Initializing,
    Running,
    Closed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Initializing => "initializing",
            PipelineState::Running => "running",
            PipelineState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_record(name: &str) -> TrackingRecord {
        TrackingRecord {
            event_name: name.to_string(),
            value: None,
            identity: "install-1".to_string(),
            session_id: "session-1".to_string(),
            platform: "linux".to_string(),
            app_version: "1.0.0".to_string(),
            custom_data: None,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_payload_encoding() {
        assert_eq!(Payload::None.encode(), None);
        assert_eq!(Payload::from("").encode(), None);
        assert_eq!(Payload::Fields(Default::default()).encode(), None);

        let encoded = Payload::from("clicked").encode().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(parsed, serde_json::json!({"value": "clicked"}));

        let payload = Payload::from(serde_json::json!({"button": "ok", "count": 2}));
        let parsed: serde_json::Value = serde_json::from_str(&payload.encode().unwrap()).unwrap();
        assert_eq!(parsed["button"], "ok");
        assert_eq!(parsed["count"], 2);
    }

    #[test]
    fn test_payload_from_json_value() {
        assert_eq!(Payload::from(serde_json::Value::Null), Payload::None);
        assert_eq!(
            Payload::from(serde_json::json!("x")),
            Payload::Text("x".to_string())
        );
        assert_eq!(
            Payload::from(serde_json::json!(42)),
            Payload::Text("42".to_string())
        );
    }

    #[test]
    fn test_record_wire_format() {
        let mut record = make_record("open");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event_name"], "open");
        assert_eq!(json["timestamp"], "2026-01-02T03:04:05Z");
        assert!(json.get("value").is_none());
        assert!(json.get("custom_data").is_none());

        record.value = Some("{\"value\":\"x\"}".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["value"], "{\"value\":\"x\"}");
    }

    #[test]
    fn test_batch_preserves_order() {
        let batch = Batch::new(
            ["a", "b", "c"]
                .iter()
                .map(|name| Envelope {
                    tenant_id: "acme".to_string(),
                    event: make_record(name),
                })
                .collect(),
        );
        let json = serde_json::to_value(&batch).unwrap();
        let names: Vec<_> = json["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event"]["event_name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(json["events"][0]["tenant_id"], "acme");
    }

    #[test]
    fn test_health_state_flags() {
        assert!(!HealthState::Unchecked.is_checked());
        assert!(!HealthState::Unchecked.is_alive());
        assert!(HealthState::Alive.is_checked() && HealthState::Alive.is_alive());
        assert!(HealthState::Dead.is_checked() && !HealthState::Dead.is_alive());
    }
}
