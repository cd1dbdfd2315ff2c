//! Debug checkpoints emitted by the slosh pipeline
//!
//! A hook sees four snapshots per invocation, always in this order:
//! - `PostSlosh` - right after the signals were gathered
//! - `PostFilter` - after filter, preferences and auto-suppression
//! - `PostPrivacy` - after redaction and obfuscation
//! - `PostPerform` - after the agent returned

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Pipeline checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SloshStage {
    PostSlosh,
    PostFilter,
    PostPrivacy,
    PostPerform,
}

impl std::fmt::Display for SloshStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SloshStage::PostSlosh => write!(f, "post_slosh"),
            SloshStage::PostFilter => write!(f, "post_filter"),
            SloshStage::PostPrivacy => write!(f, "post_privacy"),
            SloshStage::PostPerform => write!(f, "post_perform"),
        }
    }
}

/// Snapshot handed to a debug hook
#[derive(Debug, Clone, Serialize)]
pub struct SloshDebugEvent {
    pub stage: SloshStage,
    pub timestamp: String,
    pub agent: String,
    pub context: Map<String, Value>,
    pub meta: Map<String, Value>,
}

/// Receives pipeline snapshots
pub trait SloshDebugHook: Send + Sync {
    fn on_stage(&self, event: &SloshDebugEvent);
}

impl<F> SloshDebugHook for F
where
    F: Fn(&SloshDebugEvent) + Send + Sync,
{
    fn on_stage(&self, event: &SloshDebugEvent) {
        (self)(event)
    }
}

/// Type alias for stored hooks
pub type ArcDebugHook = Arc<dyn SloshDebugHook>;

/// Hook that writes every checkpoint to the `tracing` log
pub fn tracing_hook() -> ArcDebugHook {
    Arc::new(|event: &SloshDebugEvent| {
        tracing::debug!(
            "[Slosh] {} {} ({} keys)",
            event.agent,
            event.stage,
            event.context.len()
        );
    })
}
