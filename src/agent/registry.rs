//! Agent registry
//!
//! An explicit name -> agent map handed to whichever orchestrator needs to
//! resolve agents by id. There is no global registry; each graph, group or
//! invoker can be given its own.

use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::slosh_agent::AgentFuture;
use super::traits::{Agent, AgentMetadata, ArcAgent};
use crate::core::{
    AgentError, AgentInput, AgentOutcome, FrameworkError, FrameworkResult, Slush,
};
use crate::subagent::SubAgentRequest;

/// Registry that holds agents by name
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, ArcAgent>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own name, replacing any previous one
    pub fn register<A: Agent + 'static>(&mut self, agent: A) {
        self.register_arc(Arc::new(agent));
    }

    pub fn register_arc(&mut self, agent: ArcAgent) {
        let name = agent.name().to_string();
        tracing::info!("[AgentRegistry] Registering agent: {}", name);
        self.agents.insert(name, agent);
    }

    /// Builder-style register
    pub fn with<A: Agent + 'static>(mut self, agent: A) -> Self {
        self.register(agent);
        self
    }

    pub fn get(&self, name: &str) -> Option<ArcAgent> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata of every agent, sorted by name
    pub fn metadata(&self) -> Vec<AgentMetadata> {
        let mut metadata: Vec<AgentMetadata> = self.agents.values().map(|a| a.metadata()).collect();
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Execute an agent by name
    pub async fn execute(&self, name: &str, input: AgentInput) -> FrameworkResult<AgentOutcome> {
        let agent = self
            .get(name)
            .ok_or_else(|| FrameworkError::AgentNotFound(name.to_string()))?;

        tracing::debug!("[AgentRegistry] Executing agent: {}", name);
        let outcome = agent.execute(input).await?;
        Ok(outcome)
    }

    /// Executor for `BroadcastManager::broadcast`
    ///
    /// The message becomes the agent's input; forwarded slush is keyed by
    /// its source agent.
    pub fn broadcast_executor(
        self: &Arc<Self>,
    ) -> impl Fn(String, Value, Option<Slush>) -> AgentFuture + Send + Sync + Clone + 'static {
        let registry = self.clone();
        move |agent_id: String, message: Value, upstream: Option<Slush>| {
            let registry = registry.clone();
            async move {
                let mut input = AgentInput::from_value(message);
                if let Some(slush) = upstream {
                    input = input.with_upstream(slush.source_agent().to_string(), slush);
                }
                registry
                    .execute(&agent_id, input)
                    .await
                    .map_err(AgentError::from)
            }
            .boxed()
        }
    }

    /// Executor for `SubAgentManager::set_executor`
    ///
    /// The invoked agent finds the manager and its own `SubAgentContext` in
    /// `input.resources`.
    pub fn subagent_executor(
        self: &Arc<Self>,
    ) -> impl Fn(SubAgentRequest) -> AgentFuture + Send + Sync + 'static {
        let registry = self.clone();
        move |request: SubAgentRequest| {
            let registry = registry.clone();
            async move {
                let SubAgentRequest {
                    agent_id,
                    message,
                    context,
                    upstream_slush,
                    manager,
                } = request;

                let mut input = AgentInput::from_value(message)
                    .with_resource(manager)
                    .with_resource(Arc::new(context));
                if let Some(slush) = upstream_slush {
                    input = input.with_upstream(slush.source_agent().to_string(), slush);
                }
                registry
                    .execute(&agent_id, input)
                    .await
                    .map_err(AgentError::from)
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::agent_fn;
    use serde_json::json;

    fn registry() -> AgentRegistry {
        AgentRegistry::new()
            .with(agent_fn("echo", |input, _ctx| async move {
                Ok(AgentOutcome::success(input.get("message").cloned().unwrap_or_default()))
            }))
            .with(agent_fn("upstream", |_input, ctx| async move {
                let sources: Vec<String> = ctx.upstream_slush.keys().cloned().collect();
                Ok(AgentOutcome::success(json!(sources)))
            }))
    }

    #[tokio::test]
    async fn test_execute_by_name() {
        let registry = registry();
        let outcome = registry
            .execute("echo", AgentInput::from_value(json!("hi")))
            .await
            .unwrap();
        assert_eq!(outcome.payload, json!("hi"));

        assert!(matches!(
            registry.execute("missing", AgentInput::new()).await,
            Err(FrameworkError::AgentNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_names_are_sorted_and_stable() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["echo", "upstream"]);
        assert_eq!(registry.names(), registry.names());
        assert_eq!(registry.metadata(), registry.metadata());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_executor_forwards_slush() {
        let registry = Arc::new(registry());
        let executor = registry.broadcast_executor();

        let outcome = executor("upstream".to_string(), json!({}), Some(Slush::new("scout")))
            .await
            .unwrap();
        assert_eq!(outcome.payload, json!(["scout"]));

        let err = executor("nobody".to_string(), json!({}), None).await.unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }
}
