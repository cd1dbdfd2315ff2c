//! Memory store collaborator feeding memory echoes, behavioral hints and priors

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A remembered message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub message: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    "unknown".to_string()
}

impl MemoryEntry {
    pub fn new(message: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            theme: theme.into(),
        }
    }
}

/// Read access to remembered messages
///
/// Implemented by the surrounding system's storage adapter. The pipeline only
/// reads; it never writes memories.
pub trait MemoryStore: Send + Sync {
    /// Memories visible for the given user (all memories when `None`)
    fn entries(&self, user_guid: Option<&str>) -> Vec<MemoryEntry>;
}

/// Process-local memory store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with entries
    pub fn with_entries(entries: Vec<MemoryEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Remember a message
    pub fn remember(&self, message: impl Into<String>, theme: impl Into<String>) {
        self.entries.write().push(MemoryEntry::new(message, theme));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl MemoryStore for InMemoryStore {
    fn entries(&self, _user_guid: Option<&str>) -> Vec<MemoryEntry> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        store.remember("user prefers dark mode for dashboards", "preference");
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries(None)[0].theme, "preference");
    }

    #[test]
    fn test_theme_defaults_to_unknown() {
        let entry: MemoryEntry = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(entry.theme, "unknown");
    }
}
