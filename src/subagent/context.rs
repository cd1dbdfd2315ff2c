//! Recursion frame passed explicitly through every `invoke`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{CallStatus, Slush};
use crate::tracer::TraceContext;

/// One hop of the call chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHop {
    pub call_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub depth: usize,
}

/// Where a recursive call sits in the call tree
///
/// Depth is plain data: every child is built at `depth + 1` and the manager
/// refuses once `depth` reaches its `max_depth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAgentContext {
    pub depth: usize,
    pub call_id: String,

    /// Agent running at this level
    pub agent_name: String,

    /// Call chain from the root, append-only
    pub history: Vec<CallHop>,

    /// Slush from the most recent successful call made at this level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_slush: Option<Slush>,

    /// Span enclosing this level, when traced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

impl SubAgentContext {
    /// Root frame at depth 0
    pub fn root(agent_name: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            depth: 0,
            call_id: call_id.into(),
            agent_name: agent_name.into(),
            history: Vec::new(),
            last_slush: None,
            trace: None,
        }
    }

    /// Frame for a call from this level into `agent_id`
    pub fn child(&self, agent_id: &str, call_id: &str) -> Self {
        let mut history = self.history.clone();
        history.push(CallHop {
            call_id: call_id.to_string(),
            from_agent: self.agent_name.clone(),
            to_agent: agent_id.to_string(),
            depth: self.depth,
        });
        Self {
            depth: self.depth + 1,
            call_id: call_id.to_string(),
            agent_name: agent_id.to_string(),
            history,
            last_slush: None,
            trace: self.trace.clone(),
        }
    }

    /// Agents on the chain, root first
    pub fn call_chain(&self) -> Vec<&str> {
        let mut chain: Vec<&str> = self.history.iter().map(|h| h.from_agent.as_str()).collect();
        chain.push(self.agent_name.as_str());
        chain
    }
}

/// Record of one `invoke`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAgentCall {
    pub id: String,
    pub parent_agent: String,
    pub target_agent: String,
    pub message: Value,
    pub depth: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_appends_history() {
        let root = SubAgentContext::root("planner", "c0");
        let child = root.child("researcher", "c1");
        let grandchild = child.child("writer", "c2");

        assert_eq!(root.depth, 0);
        assert_eq!(child.depth, 1);
        assert_eq!(grandchild.depth, 2);
        assert!(root.history.is_empty());
        assert_eq!(grandchild.history.len(), 2);
        assert_eq!(grandchild.history[1].from_agent, "researcher");
        assert_eq!(grandchild.call_chain(), vec!["planner", "researcher", "writer"]);
    }
}
