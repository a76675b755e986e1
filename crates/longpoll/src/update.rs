//! Opaque update records.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// One record from the `updates` array. Its shape belongs to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Update(Value);

/// Best-effort discriminator for routing records without parsing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind<'a> {
    /// Account scope: the leading integer of an array record.
    Event(i64),
    /// Community scope: the `type` field of an object record.
    Named(&'a str),
    Unknown,
}

impl Update {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_json(self) -> Value {
        self.0
    }

    #[must_use]
    pub fn kind(&self) -> UpdateKind<'_> {
        match &self.0 {
            Value::Array(items) => items
                .first()
                .and_then(Value::as_i64)
                .map_or(UpdateKind::Unknown, UpdateKind::Event),
            Value::Object(map) => map
                .get("type")
                .and_then(Value::as_str)
                .map_or(UpdateKind::Unknown, UpdateKind::Named),
            _ => UpdateKind::Unknown,
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
