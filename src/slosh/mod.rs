//! Signal Slosh
//!
//! Ambient context assembled before every agent call:
//! - `signals` - the six categories and how they are gathered
//! - `policy` - filter, preferences and privacy transforms
//! - `feedback` - utility scores and breadcrumbs
//! - `debug` - checkpoint hooks
//! - `memory` - the memory store collaborator
//! - `pipeline` - `SloshPipeline`, which ties the above together

pub mod debug;
pub mod feedback;
pub mod memory;
pub mod path;
pub mod pipeline;
pub mod policy;
pub mod signals;

pub use debug::{tracing_hook, ArcDebugHook, SloshDebugEvent, SloshDebugHook, SloshStage};
pub use feedback::{Breadcrumb, BreadcrumbTrail, SignalFeedback, SignalUtility};
pub use memory::{InMemoryStore, MemoryEntry, MemoryStore};
pub use pipeline::{SloshPipeline, FILTER_OVERRIDE_KEY, PREFERENCES_OVERRIDE_KEY};
pub use policy::{obfuscate_value, SloshFilter, SloshPreferences, SloshPrivacy};
pub use signals::SignalCategory;
