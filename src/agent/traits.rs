//! Agent trait definitions
//!
//! `Agent` is the capability every orchestrator consumes. `Perform` is what
//! agent authors implement; `SloshAgent` wraps a `Perform` in the slosh
//! pipeline to produce an `Agent`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::{AgentInput, AgentOutcome, AgentResult, ExecutionContext};

/// Declarative description of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,

    /// JSON schema of the accepted input
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

fn default_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

impl AgentMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: default_parameters(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// An executable agent
///
/// Created once and reused across many invocations; safe to call
/// concurrently.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Get the name of this agent
    fn name(&self) -> &str;

    /// Describe the agent and its inputs
    fn metadata(&self) -> AgentMetadata {
        AgentMetadata::new(self.name())
    }

    /// Run the agent
    async fn execute(&self, input: AgentInput) -> AgentResult<AgentOutcome>;
}

/// Type alias for shared agents
pub type ArcAgent = Arc<dyn Agent>;

/// An agent's own logic, run inside the slosh pipeline
#[async_trait]
pub trait Perform: Send + Sync {
    async fn perform(&self, input: &AgentInput, ctx: &ExecutionContext)
        -> AgentResult<AgentOutcome>;
}
