//! Signal slosh pipeline
//!
//! Runs around every agent invocation:
//!
//! 1. decay utility scores
//! 2. gather all six signal categories (or a minimal document when privacy
//!    is disabled)
//! 3. filter, apply preferences, auto-suppress low-utility categories
//! 4. redact and obfuscate
//! 5. attach breadcrumbs and hand the context to the agent
//! 6. after the agent returns: record feedback, push a breadcrumb, keep the
//!    emitted slush

use chrono::Local;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::debug::{tracing_hook, ArcDebugHook, SloshDebugEvent, SloshStage};
use super::feedback::{Breadcrumb, BreadcrumbTrail, SignalFeedback, SignalUtility};
use super::memory::MemoryStore;
use super::policy::{SloshFilter, SloshPreferences, SloshPrivacy};
use super::signals::{self, SignalCategory};
use crate::config::SloshConfig;
use crate::core::{AgentInput, AgentOutcome, AgentResult, ExecutionContext, Slush};

/// Per-call filter override
pub const FILTER_OVERRIDE_KEY: &str = "_slosh_filter";

/// Per-call preferences override
pub const PREFERENCES_OVERRIDE_KEY: &str = "_slosh_preferences";

/// Mutable per-instance state
#[derive(Debug, Default)]
struct PipelineState {
    utility: SignalUtility,
    breadcrumbs: BreadcrumbTrail,
    last_data_slush: Option<Slush>,
}

/// The per-agent slosh pipeline
pub struct SloshPipeline {
    agent_name: String,
    config: SloshConfig,
    filter: SloshFilter,
    preferences: SloshPreferences,
    privacy: SloshPrivacy,
    memory: Option<Arc<dyn MemoryStore>>,
    debug_hook: Option<ArcDebugHook>,
    state: Mutex<PipelineState>,
}

impl std::fmt::Debug for SloshPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SloshPipeline")
            .field("agent_name", &self.agent_name)
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("privacy", &self.privacy)
            .field("has_memory", &self.memory.is_some())
            .finish()
    }
}

impl SloshPipeline {
    pub fn new(agent_name: impl Into<String>, config: SloshConfig) -> Self {
        let breadcrumbs = BreadcrumbTrail::new(config.max_breadcrumbs);
        Self {
            agent_name: agent_name.into(),
            config,
            filter: SloshFilter::default(),
            preferences: SloshPreferences::default(),
            privacy: SloshPrivacy::default(),
            memory: None,
            debug_hook: None,
            state: Mutex::new(PipelineState {
                breadcrumbs,
                ..Default::default()
            }),
        }
    }

    pub fn with_filter(mut self, filter: SloshFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_preferences(mut self, preferences: SloshPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_privacy(mut self, privacy: SloshPrivacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Install a debug hook (turns debug checkpoints on)
    pub fn with_debug_hook(mut self, hook: ArcDebugHook) -> Self {
        self.config.debug = true;
        self.debug_hook = Some(hook);
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn config(&self) -> &SloshConfig {
        &self.config
    }

    /// Build the execution context for one call
    ///
    /// Strips the `_slosh_*` override keys from the input.
    pub fn prepare(&self, input: &mut AgentInput) -> ExecutionContext {
        let filter = take_override(input, FILTER_OVERRIDE_KEY).unwrap_or_else(|| self.filter.clone());
        let preferences = take_override(input, PREFERENCES_OVERRIDE_KEY)
            .unwrap_or_else(|| self.preferences.clone());

        let (suppressed, breadcrumbs) = {
            let mut state = self.state.lock();
            state.utility.decay(self.config.signal_decay);
            let suppressed: Vec<SignalCategory> = state
                .utility
                .suppressed(self.config.auto_suppress_threshold)
                .into_iter()
                .filter(|c| !filter.protects(*c))
                .collect();
            (suppressed, state.breadcrumbs.to_vec())
        };

        let now = Local::now().naive_local();
        let mut doc = if self.privacy.disabled {
            signals::minimal_signals(&now.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        } else {
            let memories = self
                .memory
                .as_ref()
                .map(|store| store.entries(input.get("user_guid").and_then(|v| v.as_str())))
                .unwrap_or_default();
            signals::gather(input.query(), &memories, now)
        };
        self.emit(SloshStage::PostSlosh, &doc, Map::new());

        if !self.privacy.disabled {
            filter.apply(&mut doc);
            preferences.apply(&mut doc);
            for category in &suppressed {
                tracing::debug!(
                    "[Slosh] {} auto-suppressed category {}",
                    self.agent_name,
                    category
                );
                signals::zero_category(&mut doc, *category);
            }
        }
        self.emit(SloshStage::PostFilter, &doc, Map::new());

        if !self.privacy.disabled {
            self.privacy.apply(&mut doc);
        }
        self.emit(SloshStage::PostPrivacy, &doc, Map::new());

        doc.insert(
            "breadcrumbs".to_string(),
            serde_json::to_value(breadcrumbs).unwrap_or_else(|_| Value::Array(Vec::new())),
        );

        ExecutionContext {
            agent_name: self.agent_name.clone(),
            signals: doc,
            upstream_slush: input.upstream_slush.clone(),
            trace: input.trace.clone(),
            resources: input.resources.clone(),
        }
    }

    /// Bookkeeping after the agent returned, successful or not
    pub fn finish(
        &self,
        input: &AgentInput,
        ctx: &ExecutionContext,
        result: &AgentResult<AgentOutcome>,
    ) {
        let confidence = ctx
            .signal("orientation.confidence")
            .and_then(|v| v.as_str())
            .unwrap_or("low")
            .to_string();

        {
            let mut state = self.state.lock();
            if let Some(feedback) = input.feedback() {
                state.utility.record(&feedback);
            }
            if let Ok(outcome) = result {
                if let Some(feedback) = &outcome.slosh_feedback {
                    state.utility.record(feedback);
                }
            }

            state.breadcrumbs.push(Breadcrumb {
                query: input.query().to_string(),
                timestamp: Local::now().to_rfc3339(),
                confidence,
            });

            state.last_data_slush = match result {
                Ok(outcome) => outcome.data_slush.clone(),
                Err(err) => err.data_slush().cloned(),
            };
        }

        let mut meta = Map::new();
        let result_length = match result {
            Ok(outcome) => {
                meta.insert("status".to_string(), serde_json::json!(outcome.status));
                outcome.payload.to_string().len()
            }
            Err(err) => {
                meta.insert("status".to_string(), Value::String("error".to_string()));
                err.to_string().len()
            }
        };
        meta.insert("result_length".to_string(), Value::from(result_length));
        self.emit(SloshStage::PostPerform, &ctx.signals, meta);
    }

    /// Record feedback outside of a call
    pub fn record_feedback(&self, feedback: &SignalFeedback) {
        self.state.lock().utility.record(feedback);
    }

    /// Past queries, most recent first
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.state.lock().breadcrumbs.to_vec()
    }

    /// Snapshot of the utility scores
    pub fn utility(&self) -> SignalUtility {
        self.state.lock().utility.clone()
    }

    /// Slush emitted by the most recent call
    pub fn last_data_slush(&self) -> Option<Slush> {
        self.state.lock().last_data_slush.clone()
    }

    fn emit(&self, stage: SloshStage, doc: &Map<String, Value>, meta: Map<String, Value>) {
        if !self.config.debug {
            return;
        }
        let event = SloshDebugEvent {
            stage,
            timestamp: Local::now().to_rfc3339(),
            agent: self.agent_name.clone(),
            context: doc.clone(),
            meta,
        };
        match &self.debug_hook {
            Some(hook) => hook.on_stage(&event),
            None => tracing_hook().on_stage(&event),
        }
    }
}

/// Remove an override key from the input and parse it
fn take_override<T: serde::de::DeserializeOwned>(input: &mut AgentInput, key: &str) -> Option<T> {
    let value = input.kwargs.remove(key)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("[Slosh] Ignoring malformed {}: {}", key, e);
            None
        }
    }
}
