//! Span and trace-context records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{CallStatus, Slush};

/// Identifiers handed down from a span to the work it encloses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,

    /// Key-values propagated to every descendant span's tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baggage: Option<Map<String, Value>>,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            baggage: None,
        }
    }

    /// Add a baggage item
    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.baggage
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// One timed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSpan {
    pub id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub agent_name: String,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_slush: Option<Slush>,

    /// Creation order, used to break start-time ties
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl TraceSpan {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Context a child of this span should be started with
    pub fn context(&self, baggage: Option<Map<String, Value>>) -> TraceContext {
        TraceContext {
            trace_id: self.trace_id.clone(),
            span_id: self.id.clone(),
            baggage,
        }
    }
}

/// How a span ended
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanEnd {
    pub status: CallStatus,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub data_slush: Option<Slush>,
}

impl SpanEnd {
    pub fn success() -> Self {
        Self {
            status: CallStatus::Success,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CallStatus::Error,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_outputs(mut self, outputs: Value) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_slush(mut self, slush: Option<Slush>) -> Self {
        self.data_slush = slush;
        self
    }
}
