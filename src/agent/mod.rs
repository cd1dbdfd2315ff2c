pub mod registry;
pub mod slosh_agent;
pub mod traits;

pub use registry::AgentRegistry;
pub use slosh_agent::{agent_fn, AgentFuture, FnPerform, SloshAgent};
pub use traits::{Agent, AgentMetadata, ArcAgent, Perform};
