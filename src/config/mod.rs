//! Kernel Configuration
//!
//! One serde document with a section per component. Every field has a
//! default, so an empty JSON object is a valid config.
//!
//! ```ignore
//! let config = KernelConfig::from_file("kernel.json")?
//!     .with_max_depth(3)
//!     .with_record_io(false);
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{FrameworkError, FrameworkResult};

fn default_max_breadcrumbs() -> usize {
    5
}

fn default_auto_suppress_threshold() -> f64 {
    -3.0
}

fn default_signal_decay() -> f64 {
    0.9
}

fn default_max_spans() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-agent slosh pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloshConfig {
    /// Breadcrumbs retained per agent instance
    #[serde(default = "default_max_breadcrumbs")]
    pub max_breadcrumbs: usize,

    /// Category score at or below which the category is zeroed
    #[serde(default = "default_auto_suppress_threshold")]
    pub auto_suppress_threshold: f64,

    /// Multiplier applied to every utility score at the start of a call
    #[serde(default = "default_signal_decay")]
    pub signal_decay: f64,

    /// Emit debug checkpoints
    #[serde(default)]
    pub debug: bool,
}

impl Default for SloshConfig {
    fn default() -> Self {
        Self {
            max_breadcrumbs: default_max_breadcrumbs(),
            auto_suppress_threshold: default_auto_suppress_threshold(),
            signal_decay: default_signal_decay(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Completed spans kept before the oldest are evicted
    #[serde(default = "default_max_spans")]
    pub max_spans: usize,

    /// Record sanitised inputs and outputs on spans
    #[serde(default = "default_true")]
    pub record_io: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            max_spans: default_max_spans(),
            record_io: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentSettings {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SubAgentSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Stop starting new nodes after the first failure
    #[serde(default)]
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Also write a daily-rolling log file into this directory
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

/// Configuration for every kernel component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub slosh: SloshConfig,
    #[serde(default)]
    pub tracer: TracerConfig,
    #[serde(default)]
    pub subagent: SubAgentSettings,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> FrameworkResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: KernelConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overlaid with `SLOSH_*` environment variables
    pub fn from_env() -> FrameworkResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Overlay `SLOSH_MAX_DEPTH`, `SLOSH_MAX_SPANS`, `SLOSH_RECORD_IO` and
    /// `SLOSH_LOG_LEVEL` onto this config
    pub fn with_env_overrides(self) -> FrameworkResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> FrameworkResult<Self> {
        if let Some(value) = lookup("SLOSH_MAX_DEPTH") {
            self.subagent.max_depth = parse_var("SLOSH_MAX_DEPTH", &value)?;
        }
        if let Some(value) = lookup("SLOSH_MAX_SPANS") {
            self.tracer.max_spans = parse_var("SLOSH_MAX_SPANS", &value)?;
        }
        if let Some(value) = lookup("SLOSH_RECORD_IO") {
            self.tracer.record_io = parse_var("SLOSH_RECORD_IO", &value)?;
        }
        if let Some(value) = lookup("SLOSH_LOG_LEVEL") {
            self.logging.level = value;
        }
        Ok(self)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.subagent.max_depth = max_depth;
        self
    }

    pub fn with_max_spans(mut self, max_spans: usize) -> Self {
        self.tracer.max_spans = max_spans;
        self
    }

    pub fn with_record_io(mut self, record_io: bool) -> Self {
        self.tracer.record_io = record_io;
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.graph.stop_on_error = stop_on_error;
        self
    }

    pub fn with_slosh(mut self, slosh: SloshConfig) -> Self {
        self.slosh = slosh;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> FrameworkResult<()> {
        if self.tracer.max_spans == 0 {
            return Err(FrameworkError::invalid_config("tracer.max_spans must be at least 1"));
        }
        let decay = self.slosh.signal_decay;
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(FrameworkError::invalid_config(format!(
                "slosh.signal_decay must be in (0, 1], got {}",
                decay
            )));
        }
        if self.slosh.auto_suppress_threshold > 0.0 {
            return Err(FrameworkError::invalid_config(format!(
                "slosh.auto_suppress_threshold must not be positive, got {}",
                self.slosh.auto_suppress_threshold
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> FrameworkResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FrameworkError::invalid_config(format!("{}={} is not valid", key, value)))
}
