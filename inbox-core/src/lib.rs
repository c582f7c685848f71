//! Inbox Core - Shared Types
//!
//! Vocabulary shared by every crate in the sync core: item identity, the
//! opaque change signal, the mergeable record abstraction, and the error
//! taxonomy. This crate carries no runtime behavior beyond record merging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod item;

pub use error::{ConfigError, EventSourceError, MutationError, SyncError, SyncResult};
pub use item::{Item, ItemPatch, Record};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Wall-clock timestamp in UTC, used for reporting only.
///
/// Timing decisions (debounce, floor, TTL) run on the monotonic tokio clock.
pub type Timestamp = DateTime<Utc>;

/// Unique identifier of an item in a consumer-owned collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SIGNALS
// ============================================================================

/// "The backing collection may have changed."
///
/// Carries no payload and no identity; many of these collapse into a single
/// refresh downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSignal;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_display_and_conversions() {
        let id = ItemId::from("conv-1");
        assert_eq!(id.to_string(), "conv-1");
        assert_eq!(id.as_str(), "conv-1");
        assert_eq!(ItemId::from("conv-1".to_string()), id);
        assert_eq!(id.clone().into_inner(), "conv-1");
    }

    #[test]
    fn test_item_id_serializes_transparently() {
        let id = ItemId::new("conv-9");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"conv-9\"");
        let back: ItemId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
