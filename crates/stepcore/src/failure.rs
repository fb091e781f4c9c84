use crate::{Payload, Value};
use serde::{Deserialize, Serialize};

/// Kind reported when a run outlives its time budget
pub const TIMEOUT_EXCEEDED: &str = "TimeoutExceeded";

/// Payload key a catch writes the failure into
pub const ERROR_KEY: &str = "error";

/// A classified step failure.
///
/// `kind` is the only field retry and catch rules look at; matching is an
/// exact, case-sensitive string comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl Failure {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
            detail: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TIMEOUT_EXCEEDED).with_message(message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TIMEOUT_EXCEEDED
    }

    /// Record shape written under the `error` payload key
    pub fn to_value(&self) -> Value {
        let mut map = Payload::new();
        map.insert("kind".to_string(), Value::String(self.kind.clone()));
        if let Some(message) = &self.message {
            map.insert("message".to_string(), Value::String(message.clone()));
        }
        if let Some(detail) = &self.detail {
            map.insert("detail".to_string(), detail.clone());
        }
        Value::Object(map)
    }

    /// Merge this failure into `payload` under the reserved key, keeping other fields
    pub fn merge_into(&self, payload: &mut Payload) {
        payload.insert(ERROR_KEY.to_string(), self.to_value());
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}
