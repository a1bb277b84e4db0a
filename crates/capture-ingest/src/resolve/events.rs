use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EventsParseError;

/// Normalized input-event log as stored next to a recording.
///
/// Individual events are kept as opaque JSON values; the pipeline only
/// counts them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub events: Vec<Value>,
    /// Capture parameters the client recorded alongside the events
    /// (fps, resolution, start time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl EventLog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self, EventsParseError> {
        let content = std::fs::read_to_string(path).map_err(|e| EventsParseError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Accepts either `{ "events": [...], "meta": {...}? }` or a bare array.
    pub fn parse(content: &str) -> Result<Self, EventsParseError> {
        match serde_json::from_str::<Value>(content)? {
            Value::Array(events) => Ok(Self { events, meta: None }),
            Value::Object(mut map) => {
                let events = match map.remove("events") {
                    Some(Value::Array(events)) => events,
                    _ => return Err(EventsParseError::MissingEvents),
                };
                let meta = map.remove("meta").filter(Value::is_object);
                Ok(Self { events, meta })
            }
            _ => Err(EventsParseError::MissingEvents),
        }
    }
}
