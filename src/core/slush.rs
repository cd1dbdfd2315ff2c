//! Slush - source-tagged signal bundles emitted alongside agent results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key every slush bundle carries
pub const SOURCE_AGENT_KEY: &str = "source_agent";

/// A flat, source-tagged mapping of signal name -> value
///
/// Producers and consumers agree on the shape out of band. The kernel treats
/// the bundle as pass-through data and only ever reads `source_agent`.
/// Key order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Slush {
    fields: Map<String, Value>,
}

impl Slush {
    /// Create an empty bundle tagged with its producer
    pub fn new(source_agent: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(
            SOURCE_AGENT_KEY.to_string(),
            Value::String(source_agent.into()),
        );
        Self { fields }
    }

    /// Name of the agent that produced this bundle
    pub fn source_agent(&self) -> &str {
        self.fields
            .get(SOURCE_AGENT_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    /// Insert a signal (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a signal
    ///
    /// Overwriting `source_agent` with a non-string value is ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if key == SOURCE_AGENT_KEY && !value.is_string() {
            return;
        }
        self.fields.insert(key, value);
    }

    /// Get a signal by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields, `source_agent` included
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert into a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl TryFrom<Map<String, Value>> for Slush {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get(SOURCE_AGENT_KEY) {
            Some(Value::String(_)) => Ok(Self { fields }),
            _ => Err(format!("slush is missing a string `{}`", SOURCE_AGENT_KEY)),
        }
    }
}

impl TryFrom<Value> for Slush {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Slush::try_from(map),
            other => Err(format!("slush must be an object, got {}", other)),
        }
    }
}

impl From<Slush> for Map<String, Value> {
    fn from(slush: Slush) -> Self {
        slush.fields
    }
}

impl From<Slush> for Value {
    fn from(slush: Slush) -> Self {
        Value::Object(slush.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_agent_always_present() {
        let slush = Slush::new("Summarizer").with("confidence", 0.8);
        assert_eq!(slush.source_agent(), "Summarizer");
        assert_eq!(slush.get("confidence"), Some(&json!(0.8)));
    }

    #[test]
    fn test_non_string_source_agent_ignored() {
        let mut slush = Slush::new("A");
        slush.insert(SOURCE_AGENT_KEY, 42);
        assert_eq!(slush.source_agent(), "A");
    }

    #[test]
    fn test_deserialize_requires_source_agent() {
        let ok: Result<Slush, _> = serde_json::from_value(json!({"source_agent": "X", "k": 1}));
        assert!(ok.is_ok());

        let missing: Result<Slush, _> = serde_json::from_value(json!({"k": 1}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_key_order_preserved() {
        let slush = Slush::new("A").with("zeta", 1).with("alpha", 2);
        let keys: Vec<&String> = slush.fields().keys().collect();
        assert_eq!(keys, vec!["source_agent", "zeta", "alpha"]);
    }
}
