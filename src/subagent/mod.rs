//! Recursive invocation
//!
//! An agent calls further agents through the `SubAgentManager` found in its
//! input, passing its `SubAgentContext` explicitly. Recursion is bounded by
//! the depth carried in that context.

pub mod context;
pub mod manager;

pub use context::{CallHop, SubAgentCall, SubAgentContext};
pub use manager::{SubAgentConfig, SubAgentExecutor, SubAgentManager, SubAgentRequest, TOOL_PREFIX};
