//! Dependency-graph scheduler
//!
//! A node starts as soon as every dependency reached a terminal state.
//! Ready nodes run concurrently as spawned tasks; there is no cap beyond the
//! graph's own width. A node whose dependency did not succeed is skipped,
//! and so is everything downstream of it.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::node::{GraphNode, GraphNodeResult};
use super::validate::{topological_order, validate_nodes};
use crate::config::GraphConfig;
use crate::core::{
    AgentError, AgentInput, AgentOutcome, AgentResult, FrameworkError, FrameworkResult,
    NodeStatus, RunStatus, Slush,
};
use crate::tracer::{AgentTracer, SpanEnd, TraceContext};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphOptions {
    /// Stop starting new nodes after the first failure
    pub stop_on_error: bool,
}

impl From<&GraphConfig> for GraphOptions {
    fn from(config: &GraphConfig) -> Self {
        Self {
            stop_on_error: config.stop_on_error,
        }
    }
}

/// Outcome of a graph run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRunResult {
    pub status: RunStatus,
    pub nodes: BTreeMap<String, GraphNodeResult>,

    /// Node names in the order they started (skipped nodes never start)
    pub execution_order: Vec<String>,

    /// Set when the run was stopped on error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl GraphRunResult {
    pub fn node(&self, name: &str) -> Option<&GraphNodeResult> {
        self.nodes.get(name)
    }

    /// Position of a node in the execution order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.execution_order.iter().position(|n| n == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Pending,
    Running,
    Done(NodeStatus),
}

/// What a finished node task hands back
struct NodeRun {
    name: String,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
    result: AgentResult<AgentOutcome>,
}

/// A single-use execution plan of agent invocations
///
/// ```ignore
/// let mut graph = AgentGraph::new();
/// graph.add_node(GraphNode::new("research", researcher))?;
/// graph.add_node(GraphNode::new("critique", critic))?;
/// graph.add_node(GraphNode::new("synthesize", writer).depends_on(["research", "critique"]))?;
/// let result = graph.run(kwargs).await?;
/// ```
#[derive(Default)]
pub struct AgentGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    options: GraphOptions,
    tracer: Option<Arc<AgentTracer>>,
}

impl std::fmt::Debug for AgentGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentGraph")
            .field("nodes", &self.nodes)
            .field("options", &self.options)
            .field("traced", &self.tracer.is_some())
            .finish()
    }
}

impl AgentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    /// Open a `graph.run` span and one child span per node
    pub fn with_tracer(mut self, tracer: Arc<AgentTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Add a node; names must be unique
    pub fn add_node(&mut self, node: GraphNode) -> FrameworkResult<&mut Self> {
        if self.index.contains_key(&node.name) {
            return Err(FrameworkError::DuplicateNode(node.name));
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(self)
    }

    pub fn get_node(&self, name: &str) -> Option<&GraphNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Missing dependencies and cycles; empty when runnable
    pub fn validate(&self) -> Vec<String> {
        validate_nodes(&self.nodes)
    }

    /// Node names in a valid start order (peers in insertion order)
    pub fn plan(&self) -> FrameworkResult<Vec<String>> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(FrameworkError::InvalidGraph(errors.join("\n")));
        }
        topological_order(&self.nodes)
            .ok_or_else(|| FrameworkError::InvalidGraph("no topological order".to_string()))
    }

    /// Run the plan to completion
    ///
    /// Root nodes get `initial_kwargs` underneath their own kwargs. Agent
    /// failures never abort the run; they show up in the per-node results.
    pub async fn run(self, initial_kwargs: Map<String, Value>) -> FrameworkResult<GraphRunResult> {
        let plan = self.plan()?;

        let started = Instant::now();
        tracing::info!("[AgentGraph] Running {} nodes", self.nodes.len());
        tracing::debug!("[AgentGraph] Plan: {}", plan.join(" -> "));

        let graph_span = self.tracer.as_ref().map(|tracer| {
            tracer.start_span(
                "graph",
                "graph.run",
                None,
                Some(&json!({"nodes": self.nodes.len()})),
            )
        });
        let graph_ctx = graph_span.as_ref().map(|(_, ctx)| ctx.clone());

        let mut run = Run {
            graph: &self,
            initial_kwargs,
            graph_ctx,
            progress: self.nodes.iter().map(|n| (n.name.clone(), Progress::Pending)).collect(),
            results: BTreeMap::new(),
            execution_order: Vec::new(),
            node_spans: HashMap::new(),
            running: FuturesUnordered::new(),
            stopped: None,
        };

        run.schedule();
        while let Some(finished) = run.running.next().await {
            run.complete(finished);
            run.schedule();
        }
        run.skip_unstarted();

        let status = if run.stopped.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::from_statuses(run.results.values().map(|r| &r.status))
        };

        let Run {
            results,
            execution_order,
            stopped,
            ..
        } = run;

        if let (Some(tracer), Some((span, _))) = (&self.tracer, &graph_span) {
            let end = match (&stopped, status) {
                (Some(err), _) => SpanEnd::error(err.clone()),
                (None, RunStatus::Failed) => SpanEnd::error("no node succeeded"),
                _ => SpanEnd::success(),
            };
            tracer.end_span(&span.id, end.with_outputs(json!({"status": status})));
        }

        tracing::info!(
            "[AgentGraph] Finished with status {:?} in {}ms",
            status,
            started.elapsed().as_millis()
        );

        Ok(GraphRunResult {
            status,
            nodes: results,
            execution_order,
            error: stopped,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Mutable state of one run
struct Run<'g> {
    graph: &'g AgentGraph,
    initial_kwargs: Map<String, Value>,
    graph_ctx: Option<TraceContext>,
    progress: HashMap<String, Progress>,
    results: BTreeMap<String, GraphNodeResult>,
    execution_order: Vec<String>,
    node_spans: HashMap<String, String>,
    running: FuturesUnordered<BoxFuture<'static, NodeRun>>,
    stopped: Option<String>,
}

impl Run<'_> {
    /// Start every ready node and skip every node with a failed dependency
    fn schedule(&mut self) {
        if self.stopped.is_some() {
            return;
        }
        let graph = self.graph;
        loop {
            let mut skipped_any = false;
            for node in &graph.nodes {
                if self.progress.get(&node.name) != Some(&Progress::Pending) {
                    continue;
                }
                let dep_states: Vec<Progress> = node
                    .depends_on
                    .iter()
                    .map(|d| self.progress.get(d).copied().unwrap_or(Progress::Pending))
                    .collect();
                if !dep_states.iter().all(|p| matches!(p, Progress::Done(_))) {
                    continue;
                }

                let failed_dep = node
                    .depends_on
                    .iter()
                    .zip(&dep_states)
                    .find(|(_, p)| **p != Progress::Done(NodeStatus::Success));
                match failed_dep {
                    Some((dep, _)) => {
                        tracing::debug!(
                            "[AgentGraph] Skipping {}: dependency {} did not succeed",
                            node.name,
                            dep
                        );
                        self.progress
                            .insert(node.name.clone(), Progress::Done(NodeStatus::Skipped));
                        self.results.insert(
                            node.name.clone(),
                            GraphNodeResult::skipped(
                                node.agent.name(),
                                format!("Dependency '{}' did not succeed", dep),
                            ),
                        );
                        skipped_any = true;
                    }
                    None => self.launch(node),
                }
            }
            if !skipped_any {
                break;
            }
        }
    }

    fn launch(&mut self, node: &GraphNode) {
        let mut kwargs = node.kwargs.clone();
        if node.is_root() {
            for (key, value) in &self.initial_kwargs {
                kwargs.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let mut input = AgentInput::from_kwargs(kwargs);
        for dep in &node.depends_on {
            if let Some(slush) = self.upstream_slush(dep) {
                input.upstream_slush.insert(dep.clone(), slush);
            }
        }

        if let Some(tracer) = &self.graph.tracer {
            let recorded = Value::Object(input.kwargs.clone());
            let (span, ctx) = tracer.start_span(
                node.agent.name(),
                &format!("graph.node:{}", node.name),
                self.graph_ctx.as_ref(),
                Some(&recorded),
            );
            self.node_spans.insert(node.name.clone(), span.id);
            input.trace = Some(ctx);
        }

        tracing::debug!("[AgentGraph] Starting node {}", node.name);
        self.progress.insert(node.name.clone(), Progress::Running);
        self.execution_order.push(node.name.clone());

        let name = node.name.clone();
        let agent = node.agent.clone();
        let handle = tokio::spawn(async move {
            let started_at = Utc::now();
            let result = match AssertUnwindSafe(agent.execute(input)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Panicked(format!("agent {} panicked", agent.name()))),
            };
            (started_at, Utc::now(), result)
        });
        self.running.push(
            async move {
                match handle.await {
                    Ok((started_at, finished_at, result)) => NodeRun {
                        name,
                        started_at,
                        finished_at,
                        result,
                    },
                    Err(join_err) => NodeRun {
                        name,
                        started_at: Utc::now(),
                        finished_at: Utc::now(),
                        result: Err(AgentError::from(join_err)),
                    },
                }
            }
            .boxed(),
        );
    }

    /// Slush a successful dependency hands down, synthesized if it sent none
    fn upstream_slush(&self, dep: &str) -> Option<Slush> {
        let result = self.results.get(dep)?;
        if result.status != NodeStatus::Success {
            return None;
        }
        Some(result.data_slush.clone().unwrap_or_else(|| {
            Slush::new(result.agent_name.clone())
                .with("node_name", dep)
                .with("node_result_status", "success")
        }))
    }

    fn complete(&mut self, run: NodeRun) {
        let graph = self.graph;
        let Some(node) = graph.get_node(&run.name) else {
            return;
        };
        let duration_ms = (run.finished_at - run.started_at).num_milliseconds();

        let record = match run.result {
            Ok(outcome) => {
                tracing::debug!("[AgentGraph] Node {} succeeded in {}ms", run.name, duration_ms);
                GraphNodeResult {
                    status: NodeStatus::Success,
                    agent_name: node.agent.name().to_string(),
                    result: Some(outcome.payload),
                    data_slush: outcome.data_slush,
                    error: None,
                    started_at: Some(run.started_at),
                    finished_at: Some(run.finished_at),
                    duration_ms: Some(duration_ms),
                }
            }
            Err(err) => {
                tracing::warn!("[AgentGraph] Node {} failed: {}", run.name, err);
                if graph.options.stop_on_error && self.stopped.is_none() {
                    self.stopped = Some(format!("Node '{}' failed: {}", run.name, err));
                }
                GraphNodeResult {
                    status: NodeStatus::Error,
                    agent_name: node.agent.name().to_string(),
                    result: None,
                    data_slush: err.data_slush().cloned(),
                    error: Some(err.to_string()),
                    started_at: Some(run.started_at),
                    finished_at: Some(run.finished_at),
                    duration_ms: Some(duration_ms),
                }
            }
        };

        if let (Some(tracer), Some(span_id)) = (&graph.tracer, self.node_spans.remove(&run.name)) {
            let end = match &record.error {
                Some(err) => SpanEnd::error(err.clone()),
                None => SpanEnd::success().with_outputs(record.result.clone().unwrap_or_default()),
            };
            tracer.end_span(&span_id, end.with_slush(record.data_slush.clone()));
        }

        self.progress
            .insert(run.name.clone(), Progress::Done(record.status));
        self.results.insert(run.name, record);
    }

    /// After a stop, everything that never started is skipped
    fn skip_unstarted(&mut self) {
        let graph = self.graph;
        for node in &graph.nodes {
            if self.progress.get(&node.name) == Some(&Progress::Pending) {
                self.progress
                    .insert(node.name.clone(), Progress::Done(NodeStatus::Skipped));
                self.results.insert(
                    node.name.clone(),
                    GraphNodeResult::skipped(node.agent.name(), "Run stopped on error"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{agent_fn, ArcAgent};
    use crate::tracer::TracerOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sleeper(name: &'static str, delay_ms: u64) -> ArcAgent {
        Arc::new(agent_fn(name, move |input, ctx| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let upstream: Vec<String> = ctx.upstream_slush.keys().cloned().collect();
            Ok(AgentOutcome::success(json!({
                "agent": name,
                "upstream": upstream,
                "topic": input.get("topic").cloned(),
            }))
            .with_slush(Slush::new(name).with("seen", true)))
        }))
    }

    fn failing(name: &'static str) -> ArcAgent {
        Arc::new(agent_fn(name, |_input, _ctx| async move {
            Err::<AgentOutcome, _>(AgentError::failed("upstream outage"))
        }))
    }

    fn counting(name: &'static str, calls: Arc<AtomicUsize>) -> ArcAgent {
        Arc::new(agent_fn(name, move |_input, _ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(AgentOutcome::success("counted")) }
        }))
    }

    fn add(graph: &mut AgentGraph, node: GraphNode) {
        graph.add_node(node).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fan_in_runs_after_all_dependencies() {
        let mut graph = AgentGraph::new();
        add(&mut graph, GraphNode::new("A", sleeper("alpha", 30)));
        add(&mut graph, GraphNode::new("B", sleeper("beta", 10)));
        add(&mut graph, GraphNode::new("C", sleeper("gamma", 20)));
        add(
            &mut graph,
            GraphNode::new("D", sleeper("delta", 0)).depends_on(["A", "B", "C"]),
        );

        let result = graph.run(Map::new()).await.unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.nodes.len(), 4);
        assert_eq!(result.execution_order.len(), 4);
        let d = result.position("D").unwrap();
        for dep in ["A", "B", "C"] {
            assert!(result.position(dep).unwrap() < d);
            assert!(result.nodes["D"].started_at >= result.nodes[dep].finished_at);
        }
        assert_eq!(result.nodes["D"].result.as_ref().unwrap()["upstream"], json!(["A", "B", "C"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_independent_nodes_run_concurrently() {
        let mut graph = AgentGraph::new();
        for name in ["a", "b", "c"] {
            add(&mut graph, GraphNode::new(name, sleeper("slow", 100)));
        }
        let started = Instant::now();
        let result = graph.run(Map::new()).await.unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert!(started.elapsed() < Duration::from_millis(280));
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_transitively() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut graph = AgentGraph::new();
        add(&mut graph, GraphNode::new("fetch", failing("fetcher")));
        add(&mut graph, GraphNode::new("ok", sleeper("steady", 0)));
        add(
            &mut graph,
            GraphNode::new("parse", counting("parser", calls.clone())).depends_on(["fetch", "ok"]),
        );
        add(
            &mut graph,
            GraphNode::new("report", counting("reporter", calls.clone())).depends_on(["parse"]),
        );

        let result = graph.run(Map::new()).await.unwrap();

        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(result.nodes["fetch"].status, NodeStatus::Error);
        assert_eq!(result.nodes["fetch"].error.as_deref(), Some("upstream outage"));
        assert_eq!(result.nodes["ok"].status, NodeStatus::Success);
        assert_eq!(result.nodes["parse"].status, NodeStatus::Skipped);
        assert_eq!(result.nodes["report"].status, NodeStatus::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(result.position("parse").is_none());
    }

    #[tokio::test]
    async fn test_all_failed() {
        let mut graph = AgentGraph::new();
        add(&mut graph, GraphNode::new("x", failing("x")));
        add(&mut graph, GraphNode::new("y", failing("y")).depends_on(["x"]));
        let result = graph.run(Map::new()).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_initial_kwargs_reach_roots_only() {
        let mut graph = AgentGraph::new();
        add(&mut graph, GraphNode::new("root", sleeper("root", 0)));
        add(
            &mut graph,
            GraphNode::new("pinned", sleeper("pinned", 0)).with_arg("topic", "fixed"),
        );
        add(&mut graph, GraphNode::new("leaf", sleeper("leaf", 0)).depends_on(["root"]));

        let mut kwargs = Map::new();
        kwargs.insert("topic".to_string(), json!("pipeline"));
        let result = graph.run(kwargs).await.unwrap();

        let topic = |name: &str| result.nodes[name].result.as_ref().unwrap()["topic"].clone();
        assert_eq!(topic("root"), json!("pipeline"));
        assert_eq!(topic("pinned"), json!("fixed"));
        assert_eq!(topic("leaf"), Value::Null);
    }

    #[tokio::test]
    async fn test_missing_slush_is_synthesized() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = seen.clone();
        let mut graph = AgentGraph::new();
        add(&mut graph, GraphNode::new("quiet", counting("quiet", Arc::new(AtomicUsize::new(0)))));
        add(
            &mut graph,
            GraphNode::new(
                "reader",
                Arc::new(agent_fn("reader", move |_input, ctx| {
                    *sink.lock() = ctx.upstream("quiet").cloned();
                    async move { Ok(AgentOutcome::success("read")) }
                })),
            )
            .depends_on(["quiet"]),
        );

        graph.run(Map::new()).await.unwrap();

        let slush = seen.lock().clone().unwrap();
        assert_eq!(slush.source_agent(), "quiet");
        assert_eq!(slush.get("node_name"), Some(&json!("quiet")));
        assert_eq!(slush.get("node_result_status"), Some(&json!("success")));
    }

    #[tokio::test]
    async fn test_invalid_graphs_are_refused() {
        let mut graph = AgentGraph::new();
        add(&mut graph, GraphNode::new("a", sleeper("a", 0)));
        assert!(matches!(
            graph.add_node(GraphNode::new("a", sleeper("a", 0))),
            Err(FrameworkError::DuplicateNode(name)) if name == "a"
        ));

        add(&mut graph, GraphNode::new("b", sleeper("b", 0)).depends_on(["ghost"]));
        assert_eq!(graph.validate().len(), 1);
        assert!(graph.plan().is_err());
        assert!(matches!(
            graph.run(Map::new()).await,
            Err(FrameworkError::InvalidGraph(msg)) if msg.contains("ghost")
        ));
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let mut graph = AgentGraph::new();
        add(&mut graph, GraphNode::new("synthesize", sleeper("s", 0)).depends_on(["a", "b"]));
        add(&mut graph, GraphNode::new("b", sleeper("b", 0)).depends_on(["a"]));
        add(&mut graph, GraphNode::new("a", sleeper("a", 0)));
        assert_eq!(graph.plan().unwrap(), vec!["a", "b", "synthesize"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_on_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut graph = AgentGraph::new().with_options(GraphOptions {
            stop_on_error: true,
        });
        add(&mut graph, GraphNode::new("boom", failing("boom")));
        add(&mut graph, GraphNode::new("slow", sleeper("slow", 60)));
        add(
            &mut graph,
            GraphNode::new("after", counting("after", calls.clone())).depends_on(["slow"]),
        );

        let result = graph.run(Map::new()).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.error.as_deref().unwrap_or_default().contains("boom"));
        assert_eq!(result.nodes["slow"].status, NodeStatus::Success);
        assert_eq!(result.nodes["after"].status, NodeStatus::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_traced_run() {
        let tracer = Arc::new(AgentTracer::new(TracerOptions::default()));
        let mut graph = AgentGraph::new().with_tracer(tracer.clone());
        add(&mut graph, GraphNode::new("a", sleeper("alpha", 0)));
        add(&mut graph, GraphNode::new("b", sleeper("beta", 0)).depends_on(["a"]));

        graph.run(Map::new()).await.unwrap();

        let spans = tracer.get_completed_spans(None);
        assert_eq!(spans.len(), 3);
        let root = spans.iter().find(|s| s.operation == "graph.run").unwrap();
        let trace = tracer.get_trace(&root.trace_id);
        assert_eq!(trace.len(), 3);
        assert!(trace
            .iter()
            .filter(|s| s.id != root.id)
            .all(|s| s.parent_id.as_deref() == Some(root.id.as_str())));
        assert!(tracer.get_active_spans().is_empty());
    }
}
