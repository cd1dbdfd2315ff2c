//! Graph nodes and per-node results

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::agent::ArcAgent;
use crate::core::{NodeStatus, Slush};

/// One agent invocation in a graph
///
/// Immutable once added to a graph.
#[derive(Clone)]
pub struct GraphNode {
    pub name: String,
    pub agent: ArcAgent,

    /// Static keyword arguments (win over the run's initial kwargs)
    pub kwargs: Map<String, Value>,

    /// Names of the nodes this one waits for
    pub depends_on: Vec<String>,
}

impl GraphNode {
    pub fn new(name: impl Into<String>, agent: ArcAgent) -> Self {
        Self {
            name: name.into(),
            agent,
            kwargs: Map::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_root(&self) -> bool {
        self.depends_on.is_empty()
    }
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .field("kwargs", &self.kwargs)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// What happened to one node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNodeResult {
    pub status: NodeStatus,
    pub agent_name: String,

    /// The agent's payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_slush: Option<Slush>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl GraphNodeResult {
    pub fn skipped(agent_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Skipped,
            agent_name: agent_name.into(),
            result: None,
            data_slush: None,
            error: Some(reason.into()),
            started_at: None,
            finished_at: None,
            duration_ms: None,
        }
    }
}
