//! Kernel error types

use thiserror::Error;

use super::slush::Slush;

/// Failure raised by an agent's own logic
///
/// Captured per graph node / broadcast member as an `error` status. It never
/// aborts sibling executions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// The agent reported a failure
    ///
    /// A failing agent may still hand a slush bundle on (broadcast fallback
    /// forwards it to the next agent in line).
    #[error("{message}")]
    Failed {
        message: String,
        data_slush: Option<Slush>,
    },

    /// The task running the agent panicked
    #[error("Agent task panicked: {0}")]
    Panicked(String),
}

impl AgentError {
    /// Create a failure with just a message
    pub fn failed(msg: impl Into<String>) -> Self {
        AgentError::Failed {
            message: msg.into(),
            data_slush: None,
        }
    }

    /// Create a failure that still carries a slush bundle
    pub fn failed_with_slush(msg: impl Into<String>, slush: Slush) -> Self {
        AgentError::Failed {
            message: msg.into(),
            data_slush: Some(slush),
        }
    }

    /// The slush bundle attached to the failure, if any
    pub fn data_slush(&self) -> Option<&Slush> {
        match self {
            AgentError::Failed { data_slush, .. } => data_slush.as_ref(),
            AgentError::Panicked(_) => None,
        }
    }
}

/// Errors raised by the kernel itself
#[derive(Error, Debug)]
pub enum FrameworkError {
    /// Recursive invocation refused before the target started
    #[error("Cannot invoke agent {agent}: depth={depth}, maxDepth={max_depth}")]
    DepthExceeded {
        agent: String,
        depth: usize,
        max_depth: usize,
    },

    /// The sub-agent manager has no executor
    #[error("No agent executor configured")]
    ExecutorNotConfigured,

    /// Broadcast to a group that was never registered
    #[error("Broadcast group not found: {0}")]
    GroupNotFound(String),

    /// Agent lookup failed in an explicit registry
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// A node with the same name is already part of the graph
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    /// Missing dependencies or cycles
    #[error("Graph validation failed:\n{0}")]
    InvalidGraph(String),

    /// Malformed sub-agent tool name
    #[error("Invalid sub-agent tool name: {0}")]
    InvalidToolCall(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The invoked agent failed
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FrameworkError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        FrameworkError::InvalidConfig(msg.into())
    }
}

/// Lets agent logic use `?` on invoker calls inside `perform`
impl From<FrameworkError> for AgentError {
    fn from(err: FrameworkError) -> Self {
        match err {
            FrameworkError::Agent(inner) => inner,
            other => AgentError::failed(other.to_string()),
        }
    }
}

/// A spawned agent task that did not return
impl From<tokio::task::JoinError> for AgentError {
    fn from(err: tokio::task::JoinError) -> Self {
        if !err.is_panic() {
            return AgentError::Panicked("task cancelled".to_string());
        }
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        AgentError::Panicked(message)
    }
}

/// Result type alias for kernel operations
pub type FrameworkResult<T> = Result<T, FrameworkError>;

/// Result type alias for agent executions
pub type AgentResult<T> = Result<T, AgentError>;
