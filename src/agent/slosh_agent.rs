//! Agents wrapped in the slosh pipeline

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use super::traits::{Agent, AgentMetadata, Perform};
use crate::config::SloshConfig;
use crate::core::{AgentInput, AgentOutcome, AgentResult, ExecutionContext, Slush};
use crate::slosh::{
    ArcDebugHook, Breadcrumb, MemoryStore, SignalFeedback, SloshFilter, SloshPipeline,
    SloshPreferences, SloshPrivacy,
};

/// An agent whose logic runs after the slosh pipeline built its context
///
/// ```ignore
/// let agent = SloshAgent::new(AgentMetadata::new("summarizer"), Summarizer)
///     .with_filter(SloshFilter::include([SignalCategory::Temporal]))
///     .with_memory(store);
/// let outcome = agent.execute(AgentInput::new().with_query("today's deals")).await?;
/// ```
pub struct SloshAgent<P> {
    metadata: AgentMetadata,
    pipeline: SloshPipeline,
    logic: P,
}

impl<P: Perform> SloshAgent<P> {
    pub fn new(metadata: AgentMetadata, logic: P) -> Self {
        Self::with_config(metadata, logic, SloshConfig::default())
    }

    pub fn with_config(metadata: AgentMetadata, logic: P, config: SloshConfig) -> Self {
        let pipeline = SloshPipeline::new(metadata.name.clone(), config);
        Self {
            metadata,
            pipeline,
            logic,
        }
    }

    pub fn with_filter(mut self, filter: SloshFilter) -> Self {
        self.pipeline = self.pipeline.with_filter(filter);
        self
    }

    pub fn with_preferences(mut self, preferences: SloshPreferences) -> Self {
        self.pipeline = self.pipeline.with_preferences(preferences);
        self
    }

    pub fn with_privacy(mut self, privacy: SloshPrivacy) -> Self {
        self.pipeline = self.pipeline.with_privacy(privacy);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.pipeline = self.pipeline.with_memory(memory);
        self
    }

    pub fn with_debug_hook(mut self, hook: ArcDebugHook) -> Self {
        self.pipeline = self.pipeline.with_debug_hook(hook);
        self
    }

    pub fn pipeline(&self) -> &SloshPipeline {
        &self.pipeline
    }

    pub fn logic(&self) -> &P {
        &self.logic
    }

    /// Slush emitted by the most recent call
    pub fn last_data_slush(&self) -> Option<Slush> {
        self.pipeline.last_data_slush()
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.pipeline.breadcrumbs()
    }

    /// Record feedback outside of a call
    pub fn record_feedback(&self, feedback: &SignalFeedback) {
        self.pipeline.record_feedback(feedback);
    }
}

#[async_trait]
impl<P: Perform> Agent for SloshAgent<P> {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> AgentMetadata {
        self.metadata.clone()
    }

    async fn execute(&self, mut input: AgentInput) -> AgentResult<AgentOutcome> {
        let ctx = self.pipeline.prepare(&mut input);
        let result = self.logic.perform(&input, &ctx).await;
        if let Err(e) = &result {
            tracing::warn!("[Agent] {} failed: {}", self.metadata.name, e);
        }
        self.pipeline.finish(&input, &ctx, &result);
        result
    }
}

/// `Perform` backed by an async closure
pub struct FnPerform<F> {
    func: F,
}

impl<F> FnPerform<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Perform for FnPerform<F>
where
    F: Fn(AgentInput, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AgentResult<AgentOutcome>> + Send + 'static,
{
    async fn perform(
        &self,
        input: &AgentInput,
        ctx: &ExecutionContext,
    ) -> AgentResult<AgentOutcome> {
        (self.func)(input.clone(), ctx.clone()).await
    }
}

/// Build a slosh agent from an async closure
///
/// ```ignore
/// let echo = agent_fn("echo", |input, _ctx| async move {
///     Ok(AgentOutcome::success(input.query().to_string()))
/// });
/// ```
pub fn agent_fn<F, Fut>(name: impl Into<String>, func: F) -> SloshAgent<FnPerform<F>>
where
    F: Fn(AgentInput, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AgentResult<AgentOutcome>> + Send + 'static,
{
    SloshAgent::new(AgentMetadata::new(name), FnPerform { func })
}

/// Boxed future returned by the executor adapters
pub type AgentFuture = BoxFuture<'static, AgentResult<AgentOutcome>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentError, OutcomeStatus};
    use crate::slosh::SignalCategory;
    use serde_json::json;

    #[tokio::test]
    async fn test_agent_fn_sees_sloshed_context() {
        let agent = agent_fn("reader", |input, ctx| async move {
            Ok(AgentOutcome::success(json!({
                "query": input.query(),
                "time_of_day": ctx.get_signal("temporal.time_of_day", json!(null)),
                "has_filter_key": input.get("_slosh_filter").is_some(),
            })))
        });

        let outcome = agent
            .execute(AgentInput::from_value(json!({
                "query": "hello",
                "_slosh_filter": {"exclude": ["temporal"]}
            })))
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.payload["query"], "hello");
        assert_eq!(outcome.payload["time_of_day"], json!(null));
        assert_eq!(outcome.payload["has_filter_key"], false);
        assert_eq!(agent.breadcrumbs()[0].query, "hello");
    }

    #[tokio::test]
    async fn test_slush_is_remembered() {
        let agent = agent_fn("emitter", |_input, ctx| async move {
            let slush = ctx.slush_out(Default::default(), Some(0.9));
            Ok(AgentOutcome::success("done").with_slush(slush))
        });
        agent.execute(AgentInput::new()).await.unwrap();

        let slush = agent.last_data_slush().unwrap();
        assert_eq!(slush.source_agent(), "emitter");
        assert_eq!(slush.get("confidence"), Some(&json!(0.9)));
    }

    #[tokio::test]
    async fn test_failures_still_record_breadcrumbs() {
        let agent = agent_fn("failing", |_input, _ctx| async move {
            Err::<AgentOutcome, _>(AgentError::failed("no data"))
        })
        .with_filter(SloshFilter::include([SignalCategory::QuerySignals]));

        let err = agent
            .execute(AgentInput::new().with_query("anything"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no data");
        assert_eq!(agent.breadcrumbs().len(), 1);
        assert_eq!(agent.metadata().name, "failing");
    }
}
