//! Lifecycle states shared by the orchestrators

use serde::{Deserialize, Serialize};

/// Terminal state of a graph node or chain step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// The agent ran and returned a result
    Success,

    /// The agent ran and failed
    Error,

    /// The agent never ran because a dependency did not succeed
    Skipped,
}

impl NodeStatus {
    /// Check if the node produced a usable result
    pub fn is_success(&self) -> bool {
        matches!(self, NodeStatus::Success)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Error => write!(f, "error"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Overall status of a graph or chain run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every node succeeded
    Success,

    /// At least one node succeeded and at least one did not
    Partial,

    /// Nothing succeeded, or the run was stopped on error
    Failed,
}

impl RunStatus {
    /// Derive the overall status from per-node statuses
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a NodeStatus>) -> Self {
        let mut succeeded = 0usize;
        let mut other = 0usize;
        for status in statuses {
            if status.is_success() {
                succeeded += 1;
            } else {
                other += 1;
            }
        }
        match (succeeded, other) {
            (_, 0) => RunStatus::Success,
            (0, _) => RunStatus::Failed,
            _ => RunStatus::Partial,
        }
    }
}

/// Status of a traced span or an in-flight sub-agent call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Running,
    Success,
    Error,
}

impl CallStatus {
    /// Check if the call has finished
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallStatus::Running)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallStatus::Running => write!(f, "running"),
            CallStatus::Success => write!(f, "success"),
            CallStatus::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_from_statuses() {
        use NodeStatus::*;
        assert_eq!(RunStatus::from_statuses(&[Success, Success]), RunStatus::Success);
        assert_eq!(RunStatus::from_statuses(&[Success, Skipped]), RunStatus::Partial);
        assert_eq!(RunStatus::from_statuses(&[Error, Skipped]), RunStatus::Failed);
        assert_eq!(RunStatus::from_statuses(&Vec::<NodeStatus>::new()), RunStatus::Success);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(NodeStatus::Skipped.to_string(), "skipped");
        assert_eq!(CallStatus::Running.to_string(), "running");
        assert!(CallStatus::Error.is_terminal());
        assert!(!CallStatus::Running.is_terminal());
    }
}
