//! Agent execution tracer
//!
//! Keeps active spans in a map and completed spans in a bounded queue.
//! Past `max_spans` the oldest completed span is evicted; active spans are
//! never evicted.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use super::span::{SpanEnd, TraceContext, TraceSpan};
use crate::config::TracerConfig;
use crate::core::{default_ids, CallStatus, SharedIds};

/// Longest string recorded verbatim on a span
const MAX_RECORDED_STRING: usize = 500;

/// Input keys never recorded on spans
const UNRECORDED_KEYS: [&str; 3] = ["_context", "_slosh_filter", "_slosh_preferences"];

/// Called with each span as it completes
pub type SpanCallback = Arc<dyn Fn(&TraceSpan) + Send + Sync>;

#[derive(Clone)]
pub struct TracerOptions {
    pub max_spans: usize,
    pub record_io: bool,
    pub on_span_complete: Option<SpanCallback>,
}

impl Default for TracerOptions {
    fn default() -> Self {
        Self::from(&TracerConfig::default())
    }
}

impl From<&TracerConfig> for TracerOptions {
    fn from(config: &TracerConfig) -> Self {
        Self {
            max_spans: config.max_spans,
            record_io: config.record_io,
            on_span_complete: None,
        }
    }
}

impl std::fmt::Debug for TracerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerOptions")
            .field("max_spans", &self.max_spans)
            .field("record_io", &self.record_io)
            .field("on_span_complete", &self.on_span_complete.is_some())
            .finish()
    }
}

impl TracerOptions {
    pub fn with_max_spans(mut self, max_spans: usize) -> Self {
        self.max_spans = max_spans;
        self
    }

    pub fn with_record_io(mut self, record_io: bool) -> Self {
        self.record_io = record_io;
        self
    }

    pub fn on_span_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TraceSpan) + Send + Sync + 'static,
    {
        self.on_span_complete = Some(Arc::new(callback));
        self
    }
}

#[derive(Default)]
struct TracerState {
    active: HashMap<String, TraceSpan>,
    completed: VecDeque<TraceSpan>,
    next_seq: u64,
}

/// Per-trace rollup in the tracer summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub trace_id: String,
    pub span_count: usize,
    pub status: CallStatus,
    pub root_agent: Option<String>,
    pub start_time: DateTime<Utc>,

    /// Sum of the finished spans' durations
    pub total_duration_ms: i64,
    pub error_count: usize,
}

/// Serialized tracer state for dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerSummary {
    pub active_spans: usize,
    pub completed_spans: usize,
    pub trace_count: usize,
    pub max_spans: usize,
    #[serde(rename = "recordIO")]
    pub record_io: bool,
    pub traces: Vec<TraceSummary>,
}

/// Records every agent invocation as a span in a parent/child tree
pub struct AgentTracer {
    options: TracerOptions,
    ids: SharedIds,
    state: Mutex<TracerState>,
}

impl std::fmt::Debug for AgentTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AgentTracer")
            .field("options", &self.options)
            .field("active", &state.active.len())
            .field("completed", &state.completed.len())
            .finish()
    }
}

impl Default for AgentTracer {
    fn default() -> Self {
        Self::new(TracerOptions::default())
    }
}

impl AgentTracer {
    pub fn new(options: TracerOptions) -> Self {
        Self::with_ids(options, default_ids())
    }

    /// Create a tracer with an explicit id source
    pub fn with_ids(options: TracerOptions, ids: SharedIds) -> Self {
        Self {
            options,
            ids,
            state: Mutex::new(TracerState::default()),
        }
    }

    pub fn from_config(config: &TracerConfig) -> Self {
        Self::new(TracerOptions::from(config))
    }

    pub fn options(&self) -> &TracerOptions {
        &self.options
    }

    /// Open a span
    ///
    /// With a parent context the span joins the parent's trace and inherits
    /// its baggage; otherwise it starts a new trace.
    pub fn start_span(
        &self,
        agent_name: &str,
        operation: &str,
        parent: Option<&TraceContext>,
        inputs: Option<&Value>,
    ) -> (TraceSpan, TraceContext) {
        let id = self.ids.next_id();
        let (trace_id, parent_id, baggage) = match parent {
            Some(ctx) => (ctx.trace_id.clone(), Some(ctx.span_id.clone()), ctx.baggage.clone()),
            None => (self.ids.next_id(), None, None),
        };

        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;

        let span = TraceSpan {
            id: id.clone(),
            trace_id,
            parent_id,
            agent_name: agent_name.to_string(),
            operation: operation.to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            status: CallStatus::Running,
            inputs: inputs.filter(|_| self.options.record_io).map(sanitize),
            outputs: None,
            error: None,
            tags: baggage.clone().unwrap_or_default(),
            data_slush: None,
            seq,
        };
        state.active.insert(id, span.clone());
        drop(state);

        tracing::debug!(
            "[Tracer] Started span {} ({}.{}) in trace {}",
            span.id,
            agent_name,
            operation,
            span.trace_id
        );
        let ctx = span.context(baggage);
        (span, ctx)
    }

    /// Close a span; unknown ids return `None`
    pub fn end_span(&self, span_id: &str, end: SpanEnd) -> Option<TraceSpan> {
        let span = {
            let mut state = self.state.lock();
            let mut span = state.active.remove(span_id)?;

            let end_time = Utc::now();
            span.duration_ms = Some((end_time - span.start_time).num_milliseconds());
            span.end_time = Some(end_time);
            span.status = end.status;
            span.error = end.error;
            span.data_slush = end.data_slush;
            if self.options.record_io {
                span.outputs = end.outputs.as_ref().map(sanitize);
            }

            state.completed.push_back(span.clone());
            while state.completed.len() > self.options.max_spans {
                state.completed.pop_front();
            }
            span
        };

        tracing::debug!(
            "[Tracer] Ended span {} ({}) after {}ms",
            span.id,
            span.status,
            span.duration_ms.unwrap_or_default()
        );
        if let Some(callback) = &self.options.on_span_complete {
            callback(&span);
        }
        Some(span)
    }

    /// Look up an active or completed span
    pub fn get_span(&self, span_id: &str) -> Option<TraceSpan> {
        let state = self.state.lock();
        state
            .active
            .get(span_id)
            .or_else(|| state.completed.iter().find(|s| s.id == span_id))
            .cloned()
    }

    /// Every span of a trace, ordered by start time
    pub fn get_trace(&self, trace_id: &str) -> Vec<TraceSpan> {
        let state = self.state.lock();
        let mut spans: Vec<TraceSpan> = state
            .active
            .values()
            .chain(state.completed.iter())
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect();
        spans.sort_by_key(|s| (s.start_time, s.seq));
        spans
    }

    /// Spans still running, in creation order
    pub fn get_active_spans(&self) -> Vec<TraceSpan> {
        let state = self.state.lock();
        let mut spans: Vec<TraceSpan> = state.active.values().cloned().collect();
        spans.sort_by_key(|s| s.seq);
        spans
    }

    /// Completed spans, newest first
    pub fn get_completed_spans(&self, limit: Option<usize>) -> Vec<TraceSpan> {
        let state = self.state.lock();
        let newest_first = state.completed.iter().rev().cloned();
        match limit {
            Some(limit) => newest_first.take(limit).collect(),
            None => newest_first.collect(),
        }
    }

    /// Discard every span
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.active.clear();
        state.completed.clear();
    }

    pub fn summary(&self) -> TracerSummary {
        let state = self.state.lock();

        let mut by_trace: BTreeMap<&str, Vec<&TraceSpan>> = BTreeMap::new();
        for span in state.active.values().chain(state.completed.iter()) {
            by_trace.entry(span.trace_id.as_str()).or_default().push(span);
        }

        // Newest trace first
        let mut ordered: Vec<(u64, TraceSummary)> = by_trace
            .into_iter()
            .filter_map(|(trace_id, spans)| {
                let first_seq = spans.iter().map(|s| s.seq).min()?;
                summarize_trace(trace_id, &spans).map(|summary| (first_seq, summary))
            })
            .collect();
        ordered.sort_by(|(seq_a, a), (seq_b, b)| {
            b.start_time.cmp(&a.start_time).then(seq_b.cmp(seq_a))
        });
        let traces: Vec<TraceSummary> = ordered.into_iter().map(|(_, summary)| summary).collect();

        TracerSummary {
            active_spans: state.active.len(),
            completed_spans: state.completed.len(),
            trace_count: traces.len(),
            max_spans: self.options.max_spans,
            record_io: self.options.record_io,
            traces,
        }
    }
}

fn summarize_trace(trace_id: &str, spans: &[&TraceSpan]) -> Option<TraceSummary> {
    let start_time = spans.iter().map(|s| s.start_time).min()?;
    let error_count = spans.iter().filter(|s| s.status == CallStatus::Error).count();
    let root = spans.iter().find(|s| s.is_root());

    let status = if error_count > 0 {
        CallStatus::Error
    } else if spans.iter().any(|s| !s.status.is_terminal()) {
        CallStatus::Running
    } else {
        CallStatus::Success
    };

    let total_duration_ms: i64 = spans.iter().filter_map(|s| s.duration_ms).sum();

    Some(TraceSummary {
        trace_id: trace_id.to_string(),
        span_count: spans.len(),
        status,
        root_agent: root.map(|r| r.agent_name.clone()),
        start_time,
        total_duration_ms,
        error_count,
    })
}

/// Strip internal keys, truncate long strings and collapse nested objects
fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut clean = Map::new();
            for (key, value) in map {
                if UNRECORDED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let recorded = match value {
                    Value::Object(_) => Value::String("[object]".to_string()),
                    other => truncate(other),
                };
                clean.insert(key.clone(), recorded);
            }
            Value::Object(clean)
        }
        other => truncate(other),
    }
}

fn truncate(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > MAX_RECORDED_STRING => {
            let head: String = s.chars().take(MAX_RECORDED_STRING).collect();
            Value::String(format!("{}...", head))
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SequentialIds, Slush};
    use serde_json::json;

    fn tracer() -> AgentTracer {
        AgentTracer::with_ids(TracerOptions::default(), Arc::new(SequentialIds::new("id")))
    }

    #[test]
    fn test_parent_child_chain() {
        let tracer = tracer();
        let (a, ctx_a) = tracer.start_span("A", "execute", None, None);
        let (b, ctx_b) = tracer.start_span("B", "execute", Some(&ctx_a), None);
        let (c, _) = tracer.start_span("C", "execute", Some(&ctx_b), None);

        assert_eq!(a.trace_id, b.trace_id);
        assert_eq!(b.trace_id, c.trace_id);
        assert!(a.parent_id.is_none());
        assert_eq!(b.parent_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(c.parent_id.as_deref(), Some(b.id.as_str()));

        for span in [&c, &b, &a] {
            assert!(tracer.end_span(&span.id, SpanEnd::success()).is_some());
        }
        let trace = tracer.get_trace(&a.trace_id);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[0].agent_name, "A");
        assert!(tracer.get_active_spans().is_empty());
    }

    #[test]
    fn test_unknown_span_is_none() {
        let tracer = tracer();
        assert!(tracer.end_span("missing", SpanEnd::success()).is_none());
        assert!(tracer.get_span("missing").is_none());
    }

    #[test]
    fn test_completed_spans_are_bounded_and_newest_first() {
        let tracer = AgentTracer::new(TracerOptions::default().with_max_spans(2));
        let names = ["one", "two", "three"];
        for name in names {
            let (span, _) = tracer.start_span(name, "execute", None, None);
            tracer.end_span(&span.id, SpanEnd::success());
        }
        let (running, _) = tracer.start_span("running", "execute", None, None);

        let completed: Vec<String> = tracer
            .get_completed_spans(None)
            .into_iter()
            .map(|s| s.agent_name)
            .collect();
        assert_eq!(completed, vec!["three", "two"]);
        assert_eq!(tracer.get_completed_spans(Some(1)).len(), 1);
        assert_eq!(tracer.get_active_spans()[0].id, running.id);
    }

    #[test]
    fn test_reads_are_idempotent() {
        let tracer = tracer();
        let (root, ctx) = tracer.start_span("root", "execute", None, None);
        let (child, _) = tracer.start_span("child", "execute", Some(&ctx), None);
        tracer.end_span(&child.id, SpanEnd::success());

        assert_eq!(tracer.get_trace(&root.trace_id), tracer.get_trace(&root.trace_id));
        assert_eq!(tracer.get_completed_spans(None), tracer.get_completed_spans(None));
        assert_eq!(tracer.summary(), tracer.summary());
    }

    #[test]
    fn test_io_sanitised_and_gated() {
        let tracer = tracer();
        let long = "x".repeat(600);
        let inputs = json!({
            "query": long,
            "_slosh_filter": {"include": ["temporal"]},
            "_context": "internal",
            "nested": {"a": 1},
            "count": 3
        });
        let (span, _) = tracer.start_span("A", "execute", None, Some(&inputs));
        let recorded = span.inputs.unwrap();
        assert!(recorded.get("_slosh_filter").is_none());
        assert!(recorded.get("_context").is_none());
        assert_eq!(recorded["nested"], "[object]");
        assert_eq!(recorded["count"], 3);
        assert_eq!(recorded["query"].as_str().unwrap().len(), 503);

        let quiet = AgentTracer::new(TracerOptions::default().with_record_io(false));
        let (span, _) = quiet.start_span("A", "execute", None, Some(&inputs));
        assert!(span.inputs.is_none());
        let ended = quiet
            .end_span(&span.id, SpanEnd::success().with_outputs(json!("done")))
            .unwrap();
        assert!(ended.outputs.is_none());
    }

    #[test]
    fn test_baggage_and_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracer = AgentTracer::new(
            TracerOptions::default().on_span_complete(move |span| sink.lock().push(span.id.clone())),
        );

        let (root, ctx) = tracer.start_span("root", "execute", None, None);
        let ctx = ctx.with_baggage("tenant", "acme");
        let (child, child_ctx) = tracer.start_span("child", "execute", Some(&ctx), None);
        assert_eq!(child.tags.get("tenant"), Some(&json!("acme")));
        assert_eq!(
            child_ctx.baggage.and_then(|b| b.get("tenant").cloned()),
            Some(json!("acme"))
        );

        tracer.end_span(
            &child.id,
            SpanEnd::error("boom").with_slush(Some(Slush::new("child"))),
        );
        tracer.end_span(&root.id, SpanEnd::success());
        assert_eq!(*seen.lock(), vec![child.id.clone(), root.id.clone()]);

        let summary = tracer.summary();
        assert_eq!(summary.trace_count, 1);
        assert_eq!(summary.traces[0].error_count, 1);
        assert_eq!(summary.traces[0].status, CallStatus::Error);
        assert_eq!(summary.traces[0].root_agent.as_deref(), Some("root"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["activeSpans"], 0);
        assert_eq!(json["completedSpans"], 2);
        assert_eq!(json["recordIO"], true);
    }

    #[test]
    fn test_summary_sums_durations_newest_first() {
        let tracer = tracer();
        let (first, ctx) = tracer.start_span("first", "execute", None, None);
        let (child, _) = tracer.start_span("helper", "execute", Some(&ctx), None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        tracer.end_span(&child.id, SpanEnd::success());
        tracer.end_span(&first.id, SpanEnd::success());
        let (second, _) = tracer.start_span("second", "execute", None, None);

        let summary = tracer.summary();
        let roots: Vec<Option<&str>> =
            summary.traces.iter().map(|t| t.root_agent.as_deref()).collect();
        assert_eq!(roots, vec![Some("second"), Some("first")]);

        let expected: i64 = tracer
            .get_trace(&first.trace_id)
            .iter()
            .filter_map(|s| s.duration_ms)
            .sum();
        assert_eq!(summary.traces[1].total_duration_ms, expected);
        assert!(expected >= 10);
        assert_eq!(summary.traces[0].total_duration_ms, 0);
        assert_eq!(summary.traces[0].status, CallStatus::Running);
        assert!(tracer.get_span(&second.id).is_some());
    }

    #[test]
    fn test_clear() {
        let tracer = tracer();
        let (span, _) = tracer.start_span("A", "execute", None, None);
        tracer.clear();
        assert!(tracer.get_span(&span.id).is_none());
        assert_eq!(tracer.summary().trace_count, 0);
    }
}
