//! Broadcast groups
//!
//! - `BroadcastGroup` / `BroadcastMode` - Which agents, and how the call resolves
//! - `BroadcastManager` - Group registry and the `broadcast` operation
//! - `BroadcastResult` - Per-agent results plus the first response

pub mod group;
pub mod manager;

pub use group::{BroadcastGroup, BroadcastMode};
pub use manager::{BroadcastAgentResult, BroadcastManager, BroadcastResult, FirstResponse};
