//! Event descriptor definitions

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use uuid::Uuid;

/// One immutable event.
///
/// `sequence` is assigned by the store on append; whatever the caller puts
/// there is overwritten. `(aggregate_id, version)` identifies the event
/// within its aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub event_id: Uuid,
    pub sequence: u64,
    pub event_type: String,
    /// unix millis
    pub timestamp: i64,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub payload: Bytes,
    pub metadata: BTreeMap<String, String>,
}

impl EventDescriptor {
    /// New event with a random id and the current timestamp
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        version: i64,
        event_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Self {
            event_id: Uuid::new_v4(),
            sequence: 0,
            event_type: event_type.into(),
            timestamp,
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            version,
            payload: payload.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
