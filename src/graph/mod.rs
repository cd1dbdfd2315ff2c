//! Dependency-graph execution
//!
//! - `GraphNode` - an agent, its static kwargs and its dependencies
//! - `AgentGraph` - validates and runs the plan
//! - `GraphRunResult` - per-node results and the realized execution order

pub mod node;
pub mod scheduler;
pub mod validate;

pub use node::{GraphNode, GraphNodeResult};
pub use scheduler::{AgentGraph, GraphOptions, GraphRunResult};
pub use validate::validate_nodes;
