//! Identifier generation
//!
//! Components receive an `IdGenerator` at construction instead of sharing a
//! module-level counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of unique identifiers for spans and calls
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Shared generator handle
pub type SharedIds = Arc<dyn IdGenerator>;

/// Random 16-hex-character identifiers
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(16);
        id
    }
}

/// Deterministic `<prefix>-<n>` identifiers, handy in tests
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

/// Default generator used when none is injected
pub fn default_ids() -> SharedIds {
    Arc::new(UuidIds)
}
