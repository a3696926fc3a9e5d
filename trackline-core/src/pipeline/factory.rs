//! Builds tracking records from the current session context.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::types::{Envelope, Payload, TrackingRecord};

/// Source of event timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Identity and environment captured once at initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub tenant: String,
    /// Persistent per-install identifier
    pub identity: String,
    /// Generated per initialization
    pub session_id: String,
    pub platform: String,
    pub app_version: String,
}

/// Creates immutable [`TrackingRecord`]s.
///
/// The only side effect is reading the clock.
pub struct EventFactory {
    context: SessionContext,
    clock: Arc<dyn Clock>,
}

impl EventFactory {
    pub fn new(context: SessionContext, clock: Arc<dyn Clock>) -> Self {
        Self { context, clock }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Snapshot the context into a new record.
    ///
    /// `custom_data` is the pre-encoded blob currently configured on the
    /// pipeline; an empty string is treated as absent.
    pub fn record(
        &self,
        event_name: &str,
        payload: &Payload,
        custom_data: Option<&str>,
    ) -> TrackingRecord {
        TrackingRecord {
            event_name: event_name.to_string(),
            value: payload.encode(),
            identity: self.context.identity.clone(),
            session_id: self.context.session_id.clone(),
            platform: self.context.platform.clone(),
            app_version: self.context.app_version.clone(),
            custom_data: custom_data
                .filter(|blob| !blob.is_empty())
                .map(str::to_string),
            timestamp: self.clock.now(),
        }
    }

    /// Build a record and wrap it with the tenant identifier.
    pub fn envelope(
        &self,
        event_name: &str,
        payload: &Payload,
        custom_data: Option<&str>,
    ) -> Envelope {
        Envelope {
            tenant_id: self.context.tenant.clone(),
            event: self.record(event_name, payload, custom_data),
        }
    }
}

/// Encode a custom-data map for inclusion in records. Empty maps encode to `None`.
pub fn encode_custom_data(data: serde_json::Map<String, serde_json::Value>) -> Option<String> {
    if data.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(data).to_string())
    }
}
