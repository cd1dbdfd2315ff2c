pub mod core;
pub mod config;

// The agent contract and the pipeline that runs before every execution
pub mod agent;
pub mod slosh;

// Orchestrators
pub mod broadcast;
pub mod chain;
pub mod graph;
pub mod subagent;

// Cross-cutting
pub mod logging;
pub mod tracer;

pub use agent::{agent_fn, Agent, AgentMetadata, AgentRegistry, ArcAgent, Perform, SloshAgent};
pub use broadcast::{BroadcastGroup, BroadcastManager, BroadcastMode, BroadcastResult};
pub use chain::{AgentChain, ChainRunResult, ChainStep};
pub use config::KernelConfig;
pub use core::{
    AgentError, AgentInput, AgentOutcome, ExecutionContext, FrameworkError, FrameworkResult,
    NodeStatus, RunStatus, Slush,
};
pub use graph::{AgentGraph, GraphNode, GraphRunResult};
pub use subagent::{SubAgentContext, SubAgentManager};
pub use tracer::{AgentTracer, TraceContext, TraceSpan, TracerOptions};
