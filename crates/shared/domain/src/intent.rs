use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// A named, immutable event driving reducers and effect rules.
///
/// Once dispatched an intent is shared as `Arc<Intent>` and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    kind: Cow<'static, str>,
    #[serde(default)]
    payload: Value,
}

impl Intent {
    pub fn new(kind: impl Into<Cow<'static, str>>, payload: Value) -> Self {
        Self { kind: kind.into(), payload }
    }

    /// An intent without payload.
    pub fn bare(kind: impl Into<Cow<'static, str>>) -> Self {
        Self::new(kind, Value::Null)
    }

    /// Intent type used to match reducers and effect rules.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Top-level payload field, if the payload is an object.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Top-level string payload field.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intent_serializes_with_type_tag() {
        let intent = Intent::new("view.change", json!({ "viewName": "list" }));
        let raw = serde_json::to_value(&intent).expect("serialize");
        assert_eq!(raw, json!({ "type": "view.change", "payload": { "viewName": "list" } }));
        assert_eq!(intent.field_str("viewName"), Some("list"));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let intent: Intent = serde_json::from_value(json!({ "type": "app.ready" })).expect("parse");
        assert_eq!(intent, Intent::bare("app.ready"));
        assert!(intent.field("anything").is_none());
    }
}
