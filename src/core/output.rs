//! Agent input and outcome types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::context::ResourceMap;
use super::slush::Slush;
use crate::slosh::SignalFeedback;
use crate::tracer::TraceContext;

/// Input keys searched, in order, for the invocation's query text
const QUERY_KEYS: [&str; 3] = ["query", "request", "user_input"];

/// Input handed to `Agent::execute`
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    /// Free-form keyword arguments
    pub kwargs: Map<String, Value>,

    /// Slush forwarded from dependencies or callers, keyed by producer id
    pub upstream_slush: BTreeMap<String, Slush>,

    /// Trace context of the caller's span
    pub trace: Option<TraceContext>,

    /// Runtime collaborators (e.g. the sub-agent manager)
    pub resources: ResourceMap,
}

impl AgentInput {
    /// Create an empty input
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an input from keyword arguments
    pub fn from_kwargs(kwargs: Map<String, Value>) -> Self {
        Self {
            kwargs,
            ..Default::default()
        }
    }

    /// Create an input from a JSON value (non-objects land under `message`)
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(kwargs) => Self::from_kwargs(kwargs),
            other => {
                let mut kwargs = Map::new();
                kwargs.insert("message".to_string(), other);
                Self::from_kwargs(kwargs)
            }
        }
    }

    /// Set the query text
    pub fn with_query(self, query: impl Into<String>) -> Self {
        self.with_arg("query", Value::String(query.into()))
    }

    /// Set a keyword argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Add an upstream slush bundle
    pub fn with_upstream(mut self, producer_id: impl Into<String>, slush: Slush) -> Self {
        self.upstream_slush.insert(producer_id.into(), slush);
        self
    }

    /// Attach the caller's trace context
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Attach a shared collaborator
    pub fn with_resource<T: Send + Sync + 'static>(mut self, resource: Arc<T>) -> Self {
        self.resources.insert_arc(resource);
        self
    }

    /// Get a keyword argument
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Query text: `query`, then `request`, then `user_input`
    pub fn query(&self) -> &str {
        QUERY_KEYS
            .iter()
            .find_map(|key| self.kwargs.get(*key).and_then(|v| v.as_str()))
            .unwrap_or("")
    }

    /// Feedback object embedded in the input under `feedback`
    pub fn feedback(&self) -> Option<SignalFeedback> {
        self.kwargs
            .get("feedback")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status reported by an agent alongside its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    #[default]
    Success,
    Info,
    Error,
}

/// Result of executing an agent
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Status reported by the agent
    #[serde(default)]
    pub status: OutcomeStatus,

    /// Primary payload
    #[serde(default)]
    pub payload: Value,

    /// Signals emitted for downstream agents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_slush: Option<Slush>,

    /// Agent's own verdict on which context signals helped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slosh_feedback: Option<SignalFeedback>,
}

impl AgentOutcome {
    /// Create a successful outcome
    pub fn success(payload: impl Into<Value>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            payload: payload.into(),
            data_slush: None,
            slosh_feedback: None,
        }
    }

    /// Create an informational outcome
    pub fn info(payload: impl Into<Value>) -> Self {
        Self {
            status: OutcomeStatus::Info,
            ..Self::success(payload)
        }
    }

    /// Attach a slush bundle
    pub fn with_slush(mut self, slush: Slush) -> Self {
        self.data_slush = Some(slush);
        self
    }

    /// Attach signal feedback
    pub fn with_feedback(mut self, feedback: SignalFeedback) -> Self {
        self.slosh_feedback = Some(feedback);
        self
    }

    /// Render as a JSON value (for embedding in a parent's payload)
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_key_precedence() {
        let input = AgentInput::new().with_arg("request", "fallback");
        assert_eq!(input.query(), "fallback");

        let input = input.with_query("primary");
        assert_eq!(input.query(), "primary");

        assert_eq!(AgentInput::new().query(), "");
    }

    #[test]
    fn test_feedback_parsed_from_input() {
        let input = AgentInput::from_value(json!({
            "query": "q",
            "feedback": {"useless_signals": ["behavioral.prefers_brief"]}
        }));
        let feedback = input.feedback().unwrap();
        assert!(feedback.useful_signals.is_empty());
        assert_eq!(feedback.useless_signals, vec!["behavioral.prefers_brief"]);
    }

    #[test]
    fn test_from_value_wraps_scalars() {
        let input = AgentInput::from_value(json!("hello"));
        assert_eq!(input.get("message"), Some(&json!("hello")));
    }

    #[test]
    fn test_outcome_serialization_skips_empty_slush() {
        let value = AgentOutcome::success(json!({"n": 1})).to_value();
        assert_eq!(value, json!({"status": "success", "payload": {"n": 1}}));

        let value = AgentOutcome::info("x").with_slush(Slush::new("A")).to_value();
        assert_eq!(value["data_slush"]["source_agent"], json!("A"));
        assert_eq!(value["status"], json!("info"));
    }
}
