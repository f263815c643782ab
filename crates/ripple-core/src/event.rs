//! Transient publish/complete unit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An event handed to `publish` or `complete`. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PubSubEvent {
    /// Topic the event is addressed to.
    pub topic: String,
    /// Field values matched against subscription filters.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl PubSubEvent {
    /// Build an event from a topic and a JSON object.
    ///
    /// Non-object payloads are treated as empty so that every filter matches.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            topic: topic.into(),
            payload,
        }
    }
}
