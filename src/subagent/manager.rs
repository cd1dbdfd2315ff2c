//! SubAgentManager - Lets a running agent synchronously invoke other agents
//!
//! The manager is handed to agents through `AgentInput::resources` together
//! with the caller's `SubAgentContext`. It holds no registry; agents are run
//! through the executor installed with `set_executor`.
//!
//! # Example
//!
//! ```ignore
//! // inside perform()
//! let manager = input.resources.get::<SubAgentManager>()
//!     .ok_or_else(|| AgentError::failed("no sub-agent manager"))?;
//! let parent = input.resources.get::<SubAgentContext>()
//!     .ok_or_else(|| AgentError::failed("no sub-agent context"))?;
//!
//! let mut frame = (*parent).clone();
//! let outcome = manager.invoke("researcher", json!({"query": q}), &mut frame).await?;
//! ```
//!
//! Only depth is bounded. Breadth and total call count are not.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::context::{SubAgentCall, SubAgentContext};
use crate::agent::AgentFuture;
use crate::config::SubAgentSettings;
use crate::core::{
    default_ids, AgentOutcome, CallStatus, FrameworkError, FrameworkResult, SharedIds, Slush,
};
use crate::tracer::{AgentTracer, SpanEnd};

/// Prefix of tool names routed to sub-agents
pub const TOOL_PREFIX: &str = "invoke_";

/// Everything an executor needs to run one sub-agent call
pub struct SubAgentRequest {
    pub agent_id: String,
    pub message: Value,

    /// Frame the invoked agent runs in (already at `depth + 1`)
    pub context: SubAgentContext,

    /// Slush from the caller's previous successful call
    pub upstream_slush: Option<Slush>,

    /// The manager itself, for further nesting
    pub manager: Arc<SubAgentManager>,
}

impl std::fmt::Debug for SubAgentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubAgentRequest")
            .field("agent_id", &self.agent_id)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("upstream_slush", &self.upstream_slush)
            .finish()
    }
}

/// Runs the target agent of a request
pub type SubAgentExecutor = Arc<dyn Fn(SubAgentRequest) -> AgentFuture + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct SubAgentConfig {
    /// Identity of this manager (used in logs)
    pub id: String,
    pub max_depth: usize,
}

impl SubAgentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_depth: SubAgentSettings::default().max_depth,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Bounded recursive invoker
pub struct SubAgentManager {
    config: SubAgentConfig,
    ids: SharedIds,
    executor: RwLock<Option<SubAgentExecutor>>,
    tracer: Option<Arc<AgentTracer>>,

    /// Calls still running, keyed by call id
    active: Mutex<HashMap<String, SubAgentCall>>,

    /// Finished calls in completion order
    history: Mutex<Vec<SubAgentCall>>,
}

impl SubAgentManager {
    pub fn new(config: SubAgentConfig) -> Self {
        Self {
            config,
            ids: default_ids(),
            executor: RwLock::new(None),
            tracer: None,
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn from_settings(id: impl Into<String>, settings: &SubAgentSettings) -> Self {
        Self::new(SubAgentConfig::new(id).with_max_depth(settings.max_depth))
    }

    pub fn with_ids(mut self, ids: SharedIds) -> Self {
        self.ids = ids;
        self
    }

    /// Wrap every invocation in a span
    pub fn with_tracer(mut self, tracer: Arc<AgentTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn config(&self) -> &SubAgentConfig {
        &self.config
    }

    /// Install the function that runs target agents
    pub fn set_executor<F>(&self, executor: F)
    where
        F: Fn(SubAgentRequest) -> AgentFuture + Send + Sync + 'static,
    {
        *self.executor.write() = Some(Arc::new(executor));
    }

    pub fn has_executor(&self) -> bool {
        self.executor.read().is_some()
    }

    /// Root frame for a call tree started by `root_agent`
    pub fn create_context(&self, root_agent: impl Into<String>) -> SubAgentContext {
        SubAgentContext::root(root_agent, self.ids.next_id())
    }

    /// Whether a call from `depth` may start
    pub fn can_invoke(&self, _agent_id: &str, depth: usize) -> bool {
        depth < self.config.max_depth
    }

    /// Run `agent_id` one level below `ctx`
    ///
    /// Refuses with `DepthExceeded` before anything runs once
    /// `ctx.depth >= max_depth`. A successful call's slush replaces
    /// `ctx.last_slush`.
    pub async fn invoke(
        self: &Arc<Self>,
        agent_id: &str,
        message: Value,
        ctx: &mut SubAgentContext,
    ) -> FrameworkResult<AgentOutcome> {
        if !self.can_invoke(agent_id, ctx.depth) {
            tracing::warn!(
                "[SubAgentManager:{}] Refusing {} -> {} at depth {} (max {})",
                self.config.id,
                ctx.agent_name,
                agent_id,
                ctx.depth,
                self.config.max_depth
            );
            return Err(FrameworkError::DepthExceeded {
                agent: agent_id.to_string(),
                depth: ctx.depth,
                max_depth: self.config.max_depth,
            });
        }

        let executor = self
            .executor
            .read()
            .clone()
            .ok_or(FrameworkError::ExecutorNotConfigured)?;

        let call_id = self.ids.next_id();
        let mut child = ctx.child(agent_id, &call_id);

        let span = self.tracer.as_ref().map(|tracer| {
            let (span, span_ctx) = tracer.start_span(
                agent_id,
                "subagent.invoke",
                ctx.trace.as_ref(),
                Some(&message),
            );
            child.trace = Some(span_ctx);
            span.id
        });

        self.active.lock().insert(
            call_id.clone(),
            SubAgentCall {
                id: call_id.clone(),
                parent_agent: ctx.agent_name.clone(),
                target_agent: agent_id.to_string(),
                message: message.clone(),
                depth: child.depth,
                started_at: Utc::now(),
                ended_at: None,
                status: CallStatus::Running,
                result: None,
                error: None,
            },
        );
        tracing::debug!(
            "[SubAgentManager:{}] Invoking {} -> {} (call {}, depth {})",
            self.config.id,
            ctx.agent_name,
            agent_id,
            call_id,
            child.depth
        );

        let request = SubAgentRequest {
            agent_id: agent_id.to_string(),
            message,
            context: child,
            upstream_slush: ctx.last_slush.clone(),
            manager: self.clone(),
        };
        let result = (*executor)(request).await;

        if let (Some(tracer), Some(span_id)) = (&self.tracer, &span) {
            let end = match &result {
                Ok(outcome) => SpanEnd::success()
                    .with_outputs(outcome.payload.clone())
                    .with_slush(outcome.data_slush.clone()),
                Err(e) => SpanEnd::error(e.to_string()).with_slush(e.data_slush().cloned()),
            };
            tracer.end_span(span_id, end);
        }

        let record = self.active.lock().remove(&call_id);
        if let Some(mut record) = record {
            record.ended_at = Some(Utc::now());
            match &result {
                Ok(outcome) => {
                    record.status = CallStatus::Success;
                    record.result = Some(outcome.payload.clone());
                }
                Err(e) => {
                    record.status = CallStatus::Error;
                    record.error = Some(e.to_string());
                }
            }
            self.history.lock().push(record);
        }

        let outcome = result?;
        if let Some(slush) = &outcome.data_slush {
            ctx.last_slush = Some(slush.clone());
        }
        Ok(outcome)
    }

    /// Function definition exposing `agent_id` as an `invoke_<agent_id>` tool
    pub fn tool_definition(&self, agent_id: &str, name: &str, description: &str) -> Value {
        json!({
            "name": format!("{}{}", TOOL_PREFIX, agent_id),
            "description": format!("Invoke the {} agent: {}", name, description),
            "parameters": {
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": format!("Message to send to {}", name)
                    }
                },
                "required": ["message"]
            }
        })
    }

    /// Route an `invoke_<agent_id>` tool call
    pub async fn handle_tool_call(
        self: &Arc<Self>,
        tool_name: &str,
        args: Value,
        ctx: &mut SubAgentContext,
    ) -> FrameworkResult<AgentOutcome> {
        let agent_id = tool_name
            .strip_prefix(TOOL_PREFIX)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FrameworkError::InvalidToolCall(tool_name.to_string()))?;

        let message = match args {
            Value::Object(mut map) if map.contains_key("message") => {
                map.remove("message").unwrap_or(Value::Null)
            }
            other => other,
        };
        self.invoke(agent_id, message, ctx).await
    }

    /// Calls currently running, oldest first
    pub fn active_calls(&self) -> Vec<SubAgentCall> {
        let mut calls: Vec<SubAgentCall> = self.active.lock().values().cloned().collect();
        calls.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        calls
    }

    /// Finished calls in completion order, limited to the most recent
    pub fn call_history(&self, limit: Option<usize>) -> Vec<SubAgentCall> {
        let history = self.history.lock();
        let skip = limit.map(|l| history.len().saturating_sub(l)).unwrap_or(0);
        history[skip..].to_vec()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl std::fmt::Debug for SubAgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubAgentManager")
            .field("config", &self.config)
            .field("has_executor", &self.has_executor())
            .field("active_count", &self.active.lock().len())
            .field("history_count", &self.history.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{agent_fn, Agent, AgentRegistry};
    use crate::core::{AgentError, SequentialIds};
    use crate::tracer::TracerOptions;
    use futures::FutureExt;
    use serde_json::Map;

    fn echo_manager(max_depth: usize) -> Arc<SubAgentManager> {
        let manager = Arc::new(SubAgentManager::new(
            SubAgentConfig::new("test").with_max_depth(max_depth),
        ));
        manager.set_executor(|request: SubAgentRequest| {
            async move {
                Ok(AgentOutcome::success(json!({
                    "agent": request.agent_id,
                    "depth": request.context.depth,
                    "upstream": request.upstream_slush.map(|s| s.source_agent().to_string()),
                }))
                .with_slush(Slush::new(request.context.agent_name.clone())))
            }
            .boxed()
        });
        manager
    }

    #[tokio::test]
    async fn test_max_depth_one() {
        let manager = echo_manager(1);
        let mut root = manager.create_context("root");

        let outcome = manager.invoke("worker", json!("go"), &mut root).await.unwrap();
        assert_eq!(outcome.payload["depth"], 1);

        let mut deeper = root.child("worker", "manual");
        assert_eq!(deeper.depth, 1);
        let err = manager.invoke("helper", json!("go"), &mut deeper).await.unwrap_err();
        assert!(matches!(err, FrameworkError::DepthExceeded { ref agent, .. } if agent == "helper"));
        assert!(err.to_string().contains("helper"));
        assert_eq!(manager.call_history(None).len(), 1);
    }

    #[tokio::test]
    async fn test_executor_required() {
        let manager = Arc::new(SubAgentManager::new(SubAgentConfig::new("bare")));
        let mut ctx = manager.create_context("root");
        assert!(matches!(
            manager.invoke("x", json!({}), &mut ctx).await,
            Err(FrameworkError::ExecutorNotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_last_slush_threads_between_calls() {
        let manager = echo_manager(5);
        let mut ctx = manager.create_context("root");

        let first = manager.invoke("scout", json!({}), &mut ctx).await.unwrap();
        assert_eq!(first.payload["upstream"], Value::Null);
        assert_eq!(ctx.last_slush.as_ref().map(|s| s.source_agent()), Some("scout"));

        let second = manager.invoke("analyst", json!({}), &mut ctx).await.unwrap();
        assert_eq!(second.payload["upstream"], "scout");

        let history = manager.call_history(Some(1));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].target_agent, "analyst");
        assert_eq!(history[0].status, CallStatus::Success);
        assert!(manager.active_calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_bridge() {
        let manager = echo_manager(5);
        let def = manager.tool_definition("researcher", "Researcher", "finds facts");
        assert_eq!(def["name"], "invoke_researcher");

        let mut ctx = manager.create_context("root");
        let outcome = manager
            .handle_tool_call("invoke_researcher", json!({"message": "look"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(outcome.payload["agent"], "researcher");
        assert_eq!(manager.call_history(None)[0].message, json!("look"));

        assert!(matches!(
            manager.handle_tool_call("search", json!({}), &mut ctx).await,
            Err(FrameworkError::InvalidToolCall(_))
        ));
    }

    fn nested(name: &'static str, child: Option<&'static str>) -> impl Agent {
        agent_fn(name, move |input, ctx| async move {
            let slush = ctx.slush_out(Map::new(), None);
            let mut payload = json!({"agent": name, "slush": slush.to_value()});
            if let Some(child) = child {
                let manager = input
                    .resources
                    .get::<SubAgentManager>()
                    .ok_or_else(|| AgentError::failed("no sub-agent manager"))?;
                let parent = input
                    .resources
                    .get::<SubAgentContext>()
                    .ok_or_else(|| AgentError::failed("no sub-agent context"))?;
                let mut frame = (*parent).clone();
                let inner = manager.invoke(child, json!({"query": "deeper"}), &mut frame).await?;
                payload["inner"] = inner.payload;
            }
            Ok::<_, AgentError>(AgentOutcome::success(payload).with_slush(slush))
        })
    }

    #[tokio::test]
    async fn test_three_level_recursion() {
        let registry = Arc::new(
            AgentRegistry::new()
                .with(nested("root", Some("level2")))
                .with(nested("level2", Some("level3")))
                .with(nested("level3", None)),
        );
        let tracer = Arc::new(AgentTracer::new(TracerOptions::default()));
        let manager = Arc::new(
            SubAgentManager::new(SubAgentConfig::new("test").with_max_depth(4))
                .with_ids(Arc::new(SequentialIds::new("call")))
                .with_tracer(tracer.clone()),
        );
        manager.set_executor(registry.subagent_executor());

        let mut ctx = manager.create_context("caller");
        let outcome = manager.invoke("root", json!({"query": "start"}), &mut ctx).await.unwrap();
        let payload = &outcome.payload;

        assert!(payload.get("inner").and_then(|i| i.get("inner")).is_some());
        assert_eq!(payload["slush"]["source_agent"], "root");
        assert_eq!(payload["inner"]["slush"]["source_agent"], "level2");
        assert_eq!(payload["inner"]["inner"]["slush"]["source_agent"], "level3");

        let history = manager.call_history(None);
        let depths: Vec<usize> = history.iter().map(|c| c.depth).collect();
        assert_eq!(depths, vec![3, 2, 1]);

        let spans = tracer.get_completed_spans(None);
        assert_eq!(spans.len(), 3);
        let trace_id = &spans[0].trace_id;
        assert!(spans.iter().all(|s| &s.trace_id == trace_id));
    }

    #[tokio::test]
    async fn test_recursion_refused_past_depth() {
        let registry = Arc::new(
            AgentRegistry::new()
                .with(nested("root", Some("level2")))
                .with(nested("level2", Some("level3")))
                .with(nested("level3", None)),
        );
        let manager = Arc::new(SubAgentManager::new(
            SubAgentConfig::new("test").with_max_depth(2),
        ));
        manager.set_executor(registry.subagent_executor());

        let mut ctx = manager.create_context("caller");
        let err = manager.invoke("root", json!({}), &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("level3"));

        let history = manager.call_history(None);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|c| c.status == CallStatus::Error));
    }
}
