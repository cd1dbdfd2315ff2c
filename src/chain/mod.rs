//! Sequential agent chains
//!
//! Each step runs after the previous one and receives its slush as upstream
//! slush, keyed by the previous step's name. An optional transform turns the
//! previous outcome into extra kwargs.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::agent::ArcAgent;
use crate::core::{AgentInput, AgentOutcome, NodeStatus, RunStatus, Slush};
use crate::tracer::{AgentTracer, SpanEnd};

/// Maps the previous step's outcome and slush into kwargs for the next step
pub type StepTransform =
    Arc<dyn Fn(&AgentOutcome, Option<&Slush>) -> Map<String, Value> + Send + Sync>;

#[derive(Clone)]
pub struct ChainStep {
    pub name: String,
    pub agent: ArcAgent,
    pub kwargs: Map<String, Value>,
    pub transform: Option<StepTransform>,
}

impl ChainStep {
    pub fn new(name: impl Into<String>, agent: ArcAgent) -> Self {
        Self {
            name: name.into(),
            agent,
            kwargs: Map::new(),
            transform: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&AgentOutcome, Option<&Slush>) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl std::fmt::Debug for ChainStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStep")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .field("kwargs", &self.kwargs)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStepResult {
    pub name: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_slush: Option<Slush>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRunResult {
    pub status: RunStatus,
    pub steps: Vec<ChainStepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    /// Payload of the last successful step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Value>,
}

/// Agents run one after another
#[derive(Debug, Clone)]
pub struct AgentChain {
    steps: Vec<ChainStep>,
    stop_on_error: bool,
    tracer: Option<Arc<AgentTracer>>,
}

impl Default for AgentChain {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            stop_on_error: true,
            tracer: None,
        }
    }
}

impl AgentChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Keep going after a failed step (the run ends `partial`)
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Open a `chain.run` span and one child span per step
    pub fn with_tracer(mut self, tracer: Arc<AgentTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order; `initial_kwargs` go to the first step only
    pub async fn run(&self, initial_kwargs: Map<String, Value>) -> ChainRunResult {
        let mut results: Vec<ChainStepResult> = Vec::with_capacity(self.steps.len());
        let mut previous: Option<(String, AgentOutcome, Slush)> = None;
        let mut failed_step = None;

        let run_span = self.tracer.as_ref().map(|tracer| {
            let names: Vec<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();
            tracer.start_span("chain", "chain.run", None, Some(&json!({ "steps": names })))
        });

        for (i, step) in self.steps.iter().enumerate() {
            if failed_step.is_some() && self.stop_on_error {
                results.push(ChainStepResult {
                    name: step.name.clone(),
                    status: NodeStatus::Skipped,
                    result: None,
                    data_slush: None,
                    error: None,
                });
                continue;
            }

            let mut kwargs = step.kwargs.clone();
            if i == 0 {
                for (key, value) in &initial_kwargs {
                    kwargs.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }

            let mut input = AgentInput::from_kwargs(kwargs);
            if let Some((prev_name, prev_outcome, prev_slush)) = &previous {
                if let Some(transform) = &step.transform {
                    for (key, value) in transform(prev_outcome, Some(prev_slush)) {
                        input.kwargs.insert(key, value);
                    }
                }
                input
                    .upstream_slush
                    .insert(prev_name.clone(), prev_slush.clone());
            }

            let step_span = match (&self.tracer, &run_span) {
                (Some(tracer), Some((_, run_ctx))) => {
                    let recorded = Value::Object(input.kwargs.clone());
                    let (span, ctx) = tracer.start_span(
                        step.agent.name(),
                        &format!("chain.step:{}", step.name),
                        Some(run_ctx),
                        Some(&recorded),
                    );
                    input.trace = Some(ctx);
                    Some(span.id)
                }
                _ => None,
            };

            tracing::debug!("[AgentChain] Step {} ({})", step.name, step.agent.name());
            let result = step.agent.execute(input).await;

            if let (Some(tracer), Some(span_id)) = (&self.tracer, &step_span) {
                let end = match &result {
                    Ok(outcome) => SpanEnd::success()
                        .with_outputs(outcome.payload.clone())
                        .with_slush(outcome.data_slush.clone()),
                    Err(err) => SpanEnd::error(err.to_string()).with_slush(err.data_slush().cloned()),
                };
                tracer.end_span(span_id, end);
            }

            match result {
                Ok(outcome) => {
                    let slush = outcome.data_slush.clone().unwrap_or_else(|| {
                        Slush::new(step.agent.name())
                            .with("step_name", step.name.clone())
                            .with("step_status", "success")
                    });
                    results.push(ChainStepResult {
                        name: step.name.clone(),
                        status: NodeStatus::Success,
                        result: Some(outcome.payload.clone()),
                        data_slush: outcome.data_slush.clone(),
                        error: None,
                    });
                    previous = Some((step.name.clone(), outcome, slush));
                }
                Err(err) => {
                    tracing::warn!("[AgentChain] Step {} failed: {}", step.name, err);
                    results.push(ChainStepResult {
                        name: step.name.clone(),
                        status: NodeStatus::Error,
                        result: None,
                        data_slush: err.data_slush().cloned(),
                        error: Some(err.to_string()),
                    });
                    if failed_step.is_none() {
                        failed_step = Some(step.name.clone());
                    }
                    previous = None;
                }
            }
        }

        let status = if failed_step.is_some() && self.stop_on_error {
            RunStatus::Failed
        } else {
            RunStatus::from_statuses(results.iter().map(|r| &r.status))
        };

        if let (Some(tracer), Some((span, _))) = (&self.tracer, &run_span) {
            let end = match (&failed_step, status) {
                (Some(name), RunStatus::Failed) => SpanEnd::error(format!("Step '{}' failed", name)),
                (None, RunStatus::Failed) => SpanEnd::error("no step succeeded"),
                _ => SpanEnd::success(),
            };
            tracer.end_span(&span.id, end.with_outputs(json!({ "status": status })));
        }

        ChainRunResult {
            status,
            final_result: previous.map(|(_, outcome, _)| outcome.payload),
            steps: results,
            failed_step,
        }
    }
}
