//! Value type stored under a key
//!
//! A stored value is either opaque bytes or a JSON document. The variant
//! decides how the record codec lays the payload out and whether the row can
//! take part in field queries.

use serde_json::Value as JsonValue;

/// A value held by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// Opaque binary payload, stored verbatim
    Bytes(Vec<u8>),
    /// JSON document, stored as its compact text encoding
    Json(JsonValue),
}

impl StateValue {
    /// Returns true for binary payloads
    pub fn is_binary(&self) -> bool {
        matches!(self, StateValue::Bytes(_))
    }

    /// Try to get the raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            StateValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get the JSON document
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            StateValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get a JSON string value
    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(JsonValue::as_str)
    }
}

impl From<Vec<u8>> for StateValue {
    fn from(bytes: Vec<u8>) -> Self {
        StateValue::Bytes(bytes)
    }
}

impl From<&[u8]> for StateValue {
    fn from(bytes: &[u8]) -> Self {
        StateValue::Bytes(bytes.to_vec())
    }
}

impl From<JsonValue> for StateValue {
    fn from(value: JsonValue) -> Self {
        StateValue::Json(value)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::Json(JsonValue::String(s.to_string()))
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        StateValue::Json(JsonValue::String(s))
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        StateValue::Json(JsonValue::from(n))
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Json(JsonValue::Bool(b))
    }
}
