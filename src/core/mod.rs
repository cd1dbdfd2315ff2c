//! Core types for the kernel
//!
//! This module provides the fundamental types used throughout the kernel:
//! - `AgentInput` / `AgentOutcome` - What goes into and comes out of an agent
//! - `ExecutionContext` - The per-invocation frame agent logic reads from
//! - `Slush` - Source-tagged signal bundles passed between agents
//! - `NodeStatus` / `RunStatus` / `CallStatus` - Lifecycle states
//! - `FrameworkError` / `AgentError` - Error types
//! - `IdGenerator` - Injected identifier source

pub mod context;
pub mod error;
pub mod ids;
pub mod output;
pub mod slush;
pub mod state;

pub use context::{ExecutionContext, ResourceMap};
pub use error::{AgentError, AgentResult, FrameworkError, FrameworkResult};
pub use ids::{default_ids, IdGenerator, SequentialIds, SharedIds, UuidIds};
pub use output::{AgentInput, AgentOutcome, OutcomeStatus};
pub use slush::{Slush, SOURCE_AGENT_KEY};
pub use state::{CallStatus, NodeStatus, RunStatus};
