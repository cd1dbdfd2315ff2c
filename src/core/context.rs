//! Execution context - the per-invocation frame handed to agent logic

use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::slush::Slush;
use crate::slosh::path;
use crate::slosh::SignalCategory;
use crate::tracer::TraceContext;

// ============================================================================
// ResourceMap - Type-safe container for collaborators handed to agents
// ============================================================================

/// Type-safe container for runtime collaborators
///
/// Orchestrators never put shared mutable state in here for agents to
/// coordinate through. It carries capabilities such as the sub-agent
/// manager and the active `SubAgentContext` into an agent's input.
///
/// # Example
///
/// ```ignore
/// input.resources.insert_arc(manager.clone());
///
/// // inside perform()
/// let manager = input.resources.get::<SubAgentManager>()
///     .ok_or_else(|| AgentError::failed("no sub-agent manager"))?;
/// ```
#[derive(Default, Clone)]
pub struct ResourceMap {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ResourceMap {
    /// Create a new empty resource map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a resource by type, replacing any previous value of that type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Insert an Arc-wrapped resource by type
    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.map.insert(TypeId::of::<T>(), value);
    }

    /// Get a resource by type
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|arc| arc.clone().downcast::<T>().ok())
    }

    /// Check if a resource of the given type exists
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Remove a resource by type
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<Arc<T>> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|arc| arc.downcast::<T>().ok())
    }

    /// Get the number of resources stored
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the resource map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMap")
            .field("count", &self.map.len())
            .finish()
    }
}

// ============================================================================
// ExecutionContext - built fresh per invocation
// ============================================================================

/// Context frame visible to an agent during one `perform` call
///
/// `signals` is the sloshed document: `timestamp`, the six signal
/// categories and `breadcrumbs`. Dropped when the invocation returns.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    /// Name of the agent this frame was built for
    pub agent_name: String,

    /// Signal document keyed by category name
    pub signals: Map<String, Value>,

    /// Slush handed down by dependencies, keyed by producer id
    pub upstream_slush: BTreeMap<String, Slush>,

    /// Active trace/span identifiers
    pub trace: Option<TraceContext>,

    /// Runtime collaborators (not signals)
    pub resources: ResourceMap,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("agent_name", &self.agent_name)
            .field("signals", &self.signals)
            .field("upstream_slush", &self.upstream_slush)
            .field("trace", &self.trace)
            .field("resources", &self.resources)
            .finish()
    }
}

impl ExecutionContext {
    /// Create a context around an already-gathered signal document
    pub fn new(signals: Map<String, Value>) -> Self {
        Self {
            signals,
            ..Default::default()
        }
    }

    /// Resolve a dotted path (e.g. `temporal.time_of_day`)
    pub fn signal(&self, dotted_path: &str) -> Option<&Value> {
        path::get(&self.signals, dotted_path)
    }

    /// Resolve a dotted path, falling back to `default` when absent
    pub fn get_signal(&self, dotted_path: &str, default: Value) -> Value {
        self.signal(dotted_path).cloned().unwrap_or(default)
    }

    /// Get a whole signal category
    pub fn category(&self, category: SignalCategory) -> Option<&Value> {
        self.signals.get(category.as_str())
    }

    /// Slush from a specific producer
    pub fn upstream(&self, producer_id: &str) -> Option<&Slush> {
        self.upstream_slush.get(producer_id)
    }

    /// Build a slush bundle tagged with this frame's agent
    ///
    /// Carries a timestamp plus the orientation and temporal snapshots;
    /// `signals` are merged on top.
    pub fn slush_out(&self, signals: Map<String, Value>, confidence: Option<f64>) -> Slush {
        let mut slush = Slush::new(self.agent_name.clone())
            .with("timestamp", chrono::Local::now().to_rfc3339())
            .with(
                "orientation",
                self.category(SignalCategory::Orientation).cloned().unwrap_or(Value::Null),
            )
            .with(
                "temporal",
                self.category(SignalCategory::Temporal).cloned().unwrap_or(Value::Null),
            );
        if let Some(confidence) = confidence {
            slush.insert("confidence", confidence);
        }
        for (key, value) in signals {
            slush.insert(key, value);
        }
        slush
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Marker(u32);

    #[test]
    fn test_resource_map_roundtrip() {
        let mut resources = ResourceMap::new();
        assert!(resources.is_empty());

        resources.insert(Marker(7));
        assert!(resources.contains::<Marker>());
        assert_eq!(resources.get::<Marker>().map(|m| m.0), Some(7));

        resources.remove::<Marker>();
        assert!(!resources.contains::<Marker>());
    }

    #[test]
    fn test_get_signal_with_default() {
        let signals = json!({
            "temporal": {"time_of_day": "morning", "quarter": "Q2"},
            "query_signals": {"word_count": 3}
        });
        let ctx = ExecutionContext::new(signals.as_object().cloned().unwrap_or_default());

        assert_eq!(ctx.get_signal("temporal.time_of_day", json!(null)), json!("morning"));
        assert_eq!(ctx.get_signal("query_signals.word_count", json!(0)), json!(3));
        assert_eq!(ctx.get_signal("temporal.missing", json!("fallback")), json!("fallback"));
        assert_eq!(ctx.get_signal("nope.nothing", json!(42)), json!(42));
        assert_eq!(
            ctx.category(SignalCategory::Temporal),
            Some(&json!({"time_of_day": "morning", "quarter": "Q2"}))
        );
    }
}
