//! Execution tracing
//!
//! Every invocation made by the orchestrators can be wrapped in a span.
//! Spans link into a tree through their parent ids and share a trace id with
//! the root invocation.

pub mod span;
#[allow(clippy::module_inception)]
pub mod tracer;

pub use span::{SpanEnd, TraceContext, TraceSpan};
pub use tracer::{AgentTracer, SpanCallback, TraceSummary, TracerOptions, TracerSummary};
