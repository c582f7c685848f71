//! Event source contract.
//!
//! An event source emits change notifications for a named logical resource
//! (for example the `conversations` table). Subscribers register a filter and
//! a handler and get back a token used to release the subscription.

use inbox_core::{ChangeSignal, EventSourceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Row-level change kind reported by the backend feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change published by the backend for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub resource: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(resource: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            resource: resource.into(),
            kind,
        }
    }
}

/// Selects which change events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    /// Logical resource name, e.g. `"conversations"`.
    pub resource: String,
    /// Change kinds of interest. Empty means every kind.
    #[serde(default)]
    pub kinds: Vec<ChangeKind>,
}

impl ChangeFilter {
    /// Match every change on `resource`.
    pub fn resource(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            kinds: Vec::new(),
        }
    }

    /// Narrow the filter to include `kind`.
    pub fn with_kind(mut self, kind: ChangeKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.resource == event.resource
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
    }
}

/// Callback invoked once per matching raw change.
pub type ChangeHandler = Arc<dyn Fn(ChangeSignal) + Send + Sync>;

/// Opaque handle identifying one active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(Uuid);

impl SubscriptionToken {
    /// Allocate a fresh, time-sortable token.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live feed of change notifications.
///
/// Implementations must be safe to call from any task. Handlers may be
/// invoked from whatever context the implementation publishes on, so they
/// should do no more than hand the signal off (the coalescer's handler just
/// enqueues it).
pub trait EventSource: Send + Sync {
    /// Register `handler` for every change matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is closed or refuses the filter.
    fn subscribe(
        &self,
        filter: &ChangeFilter,
        handler: ChangeHandler,
    ) -> Result<SubscriptionToken, EventSourceError>;

    /// Release a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::UnknownSubscription`] if the token was never
    /// issued or has already been released.
    fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), EventSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_resource_and_any_kind() {
        let filter = ChangeFilter::resource("conversations");
        assert!(filter.matches(&ChangeEvent::new("conversations", ChangeKind::Insert)));
        assert!(filter.matches(&ChangeEvent::new("conversations", ChangeKind::Delete)));
        assert!(!filter.matches(&ChangeEvent::new("contacts", ChangeKind::Insert)));
    }

    #[test]
    fn test_filter_narrowed_to_kinds() {
        let filter = ChangeFilter::resource("conversations")
            .with_kind(ChangeKind::Update)
            .with_kind(ChangeKind::Update);
        assert_eq!(filter.kinds, vec![ChangeKind::Update]);
        assert!(filter.matches(&ChangeEvent::new("conversations", ChangeKind::Update)));
        assert!(!filter.matches(&ChangeEvent::new("conversations", ChangeKind::Insert)));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = SubscriptionToken::new();
        let b = SubscriptionToken::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
