use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mapping threaded from one step to the next
pub type Payload = HashMap<String, Value>;

/// Structured payload value, opaque to the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Loose truthiness used by test-injection flags (`forceErrorA` and friends)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Payload> for Value {
    fn from(map: Payload) -> Self {
        Value::Object(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Convert a JSON object into a payload; anything else is rejected
pub fn payload_from_json(json: serde_json::Value) -> Option<Payload> {
    match Value::from(json) {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Render a payload as a JSON object
pub fn payload_to_json(payload: &Payload) -> serde_json::Value {
    serde_json::Value::from(Value::Object(payload.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untagged_json_shape() {
        let payload = payload_from_json(json!({
            "productoId": "P1",
            "cantidad": 2,
            "flags": [true, null],
        }))
        .unwrap();

        assert_eq!(payload.get("productoId").and_then(|v| v.as_str()), Some("P1"));
        assert_eq!(payload.get("cantidad").and_then(|v| v.as_f64()), Some(2.0));

        let text = serde_json::to_string(&payload["flags"]).unwrap();
        assert_eq!(text, "[true,null]");
    }

    #[test]
    fn test_non_object_is_not_a_payload() {
        assert!(payload_from_json(json!([1, 2, 3])).is_none());
        assert!(payload_from_json(json!("P1")).is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::from(true).is_truthy());
        assert!(!Value::from(0.0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::from("yes").is_truthy());
    }
}
