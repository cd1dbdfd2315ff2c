//! Broadcast coordinator
//!
//! Sends one message to every agent of a group through a caller-supplied
//! executor, so the coordinator never needs an agent registry of its own.

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::group::{BroadcastGroup, BroadcastMode};
use crate::core::{
    AgentError, AgentOutcome, AgentResult, FrameworkError, FrameworkResult, NodeStatus, Slush,
};
use crate::tracer::{AgentTracer, SpanEnd, TraceContext};

/// What one group member returned
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastAgentResult {
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_slush: Option<Slush>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl BroadcastAgentResult {
    fn from_result(result: &AgentResult<AgentOutcome>, duration_ms: u64) -> Self {
        match result {
            Ok(outcome) => Self {
                status: NodeStatus::Success,
                result: Some(outcome.payload.clone()),
                data_slush: outcome.data_slush.clone(),
                error: None,
                duration_ms,
            },
            Err(err) => Self {
                status: NodeStatus::Error,
                result: None,
                data_slush: err.data_slush().cloned(),
                error: Some(err.to_string()),
                duration_ms,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstResponse {
    pub agent_id: String,
    pub result: Value,
}

/// Outcome of a broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResult {
    pub group_id: String,
    pub mode: BroadcastMode,

    /// Per-agent results (in fallback mode only the agents actually tried)
    pub results: BTreeMap<String, BroadcastAgentResult>,
    pub any_succeeded: bool,

    /// Every agent of the group succeeded, counted against the group size
    ///
    /// A fallback that stops at its first agent is not `all_succeeded`
    /// unless the group has one agent; an empty group trivially is.
    pub all_succeeded: bool,

    /// First success to arrive (race) or the agent that answered (fallback)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_response: Option<FirstResponse>,
}

impl BroadcastResult {
    pub fn get(&self, agent_id: &str) -> Option<&BroadcastAgentResult> {
        self.results.get(agent_id)
    }
}

/// Registered groups plus an optional tracer
#[derive(Default)]
pub struct BroadcastManager {
    groups: RwLock<BTreeMap<String, BroadcastGroup>>,
    tracer: Option<Arc<AgentTracer>>,
}

impl std::fmt::Debug for BroadcastManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastManager")
            .field("groups", &self.groups.read().keys().collect::<Vec<_>>())
            .field("traced", &self.tracer.is_some())
            .finish()
    }
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a `broadcast` span per call and a child span per member
    pub fn with_tracer(mut self, tracer: Arc<AgentTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Register a group, replacing any group with the same id
    pub fn create_group(&self, group: BroadcastGroup) {
        tracing::info!(
            "[BroadcastManager] Group {} ({} agents, {})",
            group.id,
            group.agent_ids.len(),
            group.mode
        );
        self.groups.write().insert(group.id.clone(), group);
    }

    pub fn remove_group(&self, group_id: &str) -> Option<BroadcastGroup> {
        self.groups.write().remove(group_id)
    }

    pub fn get_group(&self, group_id: &str) -> Option<BroadcastGroup> {
        self.groups.read().get(group_id).cloned()
    }

    /// Every registered group, sorted by id
    pub fn groups(&self) -> Vec<BroadcastGroup> {
        self.groups.read().values().cloned().collect()
    }

    /// Send `message` to every agent of a group
    ///
    /// `executor(agent_id, message, upstream_slush)` runs one agent. Member
    /// failures are recorded, never raised; only an unknown group fails.
    pub async fn broadcast<F, Fut>(
        &self,
        group_id: &str,
        message: Value,
        executor: F,
    ) -> FrameworkResult<BroadcastResult>
    where
        F: Fn(String, Value, Option<Slush>) -> Fut,
        Fut: Future<Output = AgentResult<AgentOutcome>> + Send + 'static,
    {
        let group = self
            .get_group(group_id)
            .ok_or_else(|| FrameworkError::GroupNotFound(group_id.to_string()))?;

        tracing::debug!(
            "[BroadcastManager] Broadcasting to {} in {} mode",
            group.id,
            group.mode
        );

        let span = self.tracer.as_ref().map(|tracer| {
            tracer.start_span(
                &group.id,
                "broadcast",
                None,
                Some(&json!({"mode": group.mode, "agents": group.agent_ids, "message": message})),
            )
        });
        let parent = span.as_ref().map(|(_, ctx)| ctx);

        let (results, first_response) = match group.mode {
            BroadcastMode::Fallback => self.run_fallback(&group, &message, &executor, parent).await,
            BroadcastMode::All | BroadcastMode::Race => {
                let (results, first) =
                    self.run_concurrent(&group, &message, &executor, parent).await;
                let first = first.filter(|_| group.mode == BroadcastMode::Race);
                (results, first)
            }
        };

        let any_succeeded = results.values().any(BroadcastAgentResult::is_success);
        let successes = results.values().filter(|r| r.is_success()).count();
        let all_succeeded = successes == group.agent_ids.len();

        if let (Some(tracer), Some((span, _))) = (&self.tracer, &span) {
            let end = if any_succeeded {
                SpanEnd::success()
            } else {
                SpanEnd::error("no agent succeeded")
            };
            tracer.end_span(
                &span.id,
                end.with_outputs(json!({
                    "anySucceeded": any_succeeded,
                    "allSucceeded": all_succeeded,
                    "firstResponse": first_response.as_ref().map(|f| f.agent_id.clone()),
                })),
            );
        }

        tracing::info!(
            "[BroadcastManager] {}: {} results, any={}, all={}",
            group.id,
            results.len(),
            any_succeeded,
            all_succeeded
        );

        Ok(BroadcastResult {
            group_id: group.id,
            mode: group.mode,
            results,
            any_succeeded,
            all_succeeded,
            first_response,
        })
    }

    /// All members start together; results are observed in completion order
    async fn run_concurrent<F, Fut>(
        &self,
        group: &BroadcastGroup,
        message: &Value,
        executor: &F,
        parent: Option<&TraceContext>,
    ) -> (BTreeMap<String, BroadcastAgentResult>, Option<FirstResponse>)
    where
        F: Fn(String, Value, Option<Slush>) -> Fut,
        Fut: Future<Output = AgentResult<AgentOutcome>> + Send + 'static,
    {
        let mut running = FuturesUnordered::new();
        for agent_id in &group.agent_ids {
            let span_id = self.open_member_span(agent_id, parent);
            let started = Instant::now();
            let handle = tokio::spawn(executor(agent_id.clone(), message.clone(), None));
            let agent_id = agent_id.clone();
            running.push(
                async move {
                    let result = handle.await.map_err(AgentError::from).and_then(|r| r);
                    (agent_id, span_id, started.elapsed().as_millis() as u64, result)
                }
                .boxed(),
            );
        }

        let mut results = BTreeMap::new();
        let mut first_response = None;
        while let Some((agent_id, span_id, duration_ms, result)) = running.next().await {
            self.close_member_span(span_id, &result);
            if let (None, Ok(outcome)) = (&first_response, &result) {
                tracing::debug!("[BroadcastManager] First response from {}", agent_id);
                first_response = Some(FirstResponse {
                    agent_id: agent_id.clone(),
                    result: outcome.payload.clone(),
                });
            }
            if let Err(err) = &result {
                tracing::warn!("[BroadcastManager] Agent {} failed: {}", agent_id, err);
            }
            results.insert(agent_id, BroadcastAgentResult::from_result(&result, duration_ms));
        }
        (results, first_response)
    }

    /// Try members in list order until one succeeds
    ///
    /// A failing member's slush is handed to the next one.
    async fn run_fallback<F, Fut>(
        &self,
        group: &BroadcastGroup,
        message: &Value,
        executor: &F,
        parent: Option<&TraceContext>,
    ) -> (BTreeMap<String, BroadcastAgentResult>, Option<FirstResponse>)
    where
        F: Fn(String, Value, Option<Slush>) -> Fut,
        Fut: Future<Output = AgentResult<AgentOutcome>> + Send + 'static,
    {
        let mut results = BTreeMap::new();
        let mut forwarded: Option<Slush> = None;

        for agent_id in &group.agent_ids {
            let span_id = self.open_member_span(agent_id, parent);
            let started = Instant::now();
            let handle = tokio::spawn(executor(agent_id.clone(), message.clone(), forwarded.take()));
            let result = handle.await.map_err(AgentError::from).and_then(|r| r);
            let duration_ms = started.elapsed().as_millis() as u64;
            self.close_member_span(span_id, &result);
            results.insert(
                agent_id.clone(),
                BroadcastAgentResult::from_result(&result, duration_ms),
            );

            match result {
                Ok(outcome) => {
                    return (
                        results,
                        Some(FirstResponse {
                            agent_id: agent_id.clone(),
                            result: outcome.payload,
                        }),
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        "[BroadcastManager] Agent {} failed, falling back: {}",
                        agent_id,
                        err
                    );
                    forwarded = err.data_slush().cloned();
                }
            }
        }
        (results, None)
    }

    fn open_member_span(&self, agent_id: &str, parent: Option<&TraceContext>) -> Option<String> {
        self.tracer
            .as_ref()
            .map(|tracer| tracer.start_span(agent_id, "broadcast.agent", parent, None).0.id)
    }

    fn close_member_span(&self, span_id: Option<String>, result: &AgentResult<AgentOutcome>) {
        let (Some(tracer), Some(span_id)) = (&self.tracer, span_id) else {
            return;
        };
        let end = match result {
            Ok(outcome) => SpanEnd::success()
                .with_outputs(outcome.payload.clone())
                .with_slush(outcome.data_slush.clone()),
            Err(err) => SpanEnd::error(err.to_string()).with_slush(err.data_slush().cloned()),
        };
        tracer.end_span(&span_id, end);
    }
}
