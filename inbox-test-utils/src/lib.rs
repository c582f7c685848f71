//! Inbox Test Utilities
//!
//! Shared test infrastructure for the inbox workspace:
//! - Recording refresh callbacks and gated server operations
//! - Proptest generators for items, patches, and signal timelines
//! - Fixtures for conversation rows and feed events
//! - Assertions for collection contents and emission spacing

pub use inbox_core::{ConfigError, Item, ItemId, ItemPatch, MutationError, Record, SyncError};
pub use inbox_events::{ChangeEvent, ChangeKind, InMemoryEventSource};
pub use inbox_storage::{ItemCollection, SharedCollection};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Ready;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Let spawned tasks run to their next await point.
///
/// With a paused clock this is how tests observe the effects of a timer that
/// has just fired.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// MOCKS
// ============================================================================

/// Refresh callback that records when it was called.
#[derive(Debug, Clone, Default)]
pub struct RecordingRefresh {
    calls: Arc<Mutex<Vec<Instant>>>,
    failure: Option<String>,
}

impl RecordingRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose callback always reports `reason` as an error.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn callback(&self) -> impl Fn() -> Ready<Result<(), String>> + Send + Sync + 'static {
        let calls = self.calls.clone();
        let failure = self.failure.clone();
        move || {
            calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Instant::now());
            std::future::ready(match &failure {
                Some(reason) => Err(reason.clone()),
                None => Ok(()),
            })
        }
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Call times relative to `start`.
    pub fn offsets_from(&self, start: Instant) -> Vec<Duration> {
        self.instants()
            .into_iter()
            .map(|at| at.saturating_duration_since(start))
            .collect()
    }
}

/// Server operation type produced by [`ServerGate::pair`].
pub type GatedOp = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// Remote control for a server operation that settles on demand.
#[derive(Debug)]
pub struct ServerGate {
    tx: oneshot::Sender<Result<(), String>>,
}

impl ServerGate {
    /// A gate plus the operation it controls. The operation fails with
    /// "gate dropped" if the gate is dropped without settling.
    pub fn pair() -> (Self, GatedOp) {
        let (tx, rx) = oneshot::channel();
        let op: GatedOp = Box::new(move || {
            async move {
                rx.await
                    .unwrap_or_else(|_| Err("gate dropped".to_string()))
            }
            .boxed()
        });
        (Self { tx }, op)
    }

    /// Returns false if the operation was already torn down.
    pub fn succeed(self) -> bool {
        self.tx.send(Ok(())).is_ok()
    }

    pub fn fail(self, reason: impl Into<String>) -> bool {
        self.tx.send(Err(reason.into())).is_ok()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for sync core inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
        "[a-z]{1,3}[0-9]{1,4}".prop_map(ItemId::from)
    }

    pub fn arb_status() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("open".to_string()),
            Just("closed".to_string()),
            Just("snoozed".to_string()),
            Just("pending".to_string()),
        ]
    }

    pub fn arb_field_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,12}".prop_map(Value::from),
        ]
    }

    /// Patch over a small fixed key space, so patches overlap often. May
    /// carry an `id` key, which merging must ignore.
    pub fn arb_patch() -> impl Strategy<Value = ItemPatch> {
        prop::collection::btree_map(
            prop_oneof![
                Just("id".to_string()),
                Just("status".to_string()),
                Just("assignee".to_string()),
                Just("unread".to_string()),
                Just("priority".to_string()),
            ],
            arb_field_value(),
            0..4,
        )
        .prop_map(|fields| fields.into_iter().collect())
    }

    pub fn arb_item() -> impl Strategy<Value = Item> {
        (arb_item_id(), arb_status(), any::<bool>()).prop_map(|(id, status, unread)| {
            Item::new(id)
                .with_field("status", status)
                .with_field("unread", unread)
        })
    }

    /// Items with distinct ids.
    pub fn arb_collection(max: usize) -> impl Strategy<Value = Vec<Item>> {
        prop::collection::btree_map(arb_item_id(), (arb_status(), any::<bool>()), 0..max)
            .prop_map(|rows| {
                rows.into_iter()
                    .map(|(id, (status, unread))| {
                        Item::new(id)
                            .with_field("status", status)
                            .with_field("unread", unread)
                    })
                    .collect()
            })
    }

    /// Sorted signal arrival offsets in milliseconds.
    pub fn arb_signal_offsets(max_len: usize, horizon_ms: u64) -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(0..horizon_ms, 1..max_len).prop_map(|mut offsets| {
            offsets.sort_unstable();
            offsets
        })
    }

    /// A burst whose consecutive gaps all stay below `window_ms`.
    pub fn arb_tight_burst(max_len: usize, window_ms: u64) -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(0..window_ms.max(1), 0..max_len).prop_map(|gaps| {
            let mut at = 0;
            let mut offsets = vec![0];
            for gap in gaps {
                at += gap;
                offsets.push(at);
            }
            offsets
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Canned rows and events.

    use super::*;
    use serde_json::Value;

    pub const CONVERSATIONS: &str = "conversations";

    pub fn conversation(id: &str, status: &str) -> Item {
        Item::new(id)
            .with_field("status", status)
            .with_field("unread", true)
    }

    /// `count` open conversations with ids `c1..=cN`.
    pub fn open_inbox(count: usize) -> Vec<Item> {
        (1..=count)
            .map(|n| conversation(&format!("c{n}"), "open"))
            .collect()
    }

    pub fn status_patch(status: &str) -> ItemPatch {
        let mut patch = ItemPatch::new();
        patch.insert("status".to_string(), Value::from(status));
        patch
    }

    pub fn conversation_update() -> ChangeEvent {
        ChangeEvent::new(CONVERSATIONS, ChangeKind::Update)
    }

    pub fn conversation_insert() -> ChangeEvent {
        ChangeEvent::new(CONVERSATIONS, ChangeKind::Insert)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over collections and emission timelines.

    use super::*;

    /// Assert that the item `id` carries `status`.
    #[track_caller]
    pub fn assert_status(items: &[Item], id: &str, status: &str) {
        let item = items
            .iter()
            .find(|item| item.id.as_str() == id)
            .unwrap_or_else(|| panic!("No item with id {id}"));
        assert_eq!(
            item.get("status").and_then(|value| value.as_str()),
            Some(status),
            "Wrong status for {id}"
        );
    }

    /// Assert that consecutive instants are at least `min_gap` apart.
    #[track_caller]
    pub fn assert_spaced(instants: &[Instant], min_gap: Duration) {
        for pair in instants.windows(2) {
            let gap = pair[1].saturating_duration_since(pair[0]);
            assert!(
                gap >= min_gap,
                "Emissions only {:?} apart, expected at least {:?}",
                gap,
                min_gap
            );
        }
    }

    #[track_caller]
    pub fn assert_mutation_failed<T: std::fmt::Debug>(result: &Result<T, MutationError>, id: &str) {
        match result {
            Err(MutationError::Server { id: failed, .. }) => {
                assert_eq!(failed.as_str(), id, "Failure reported for wrong id");
            }
            other => panic!("Expected server failure for {id}, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_gate_settles_op() {
        let (gate, op) = ServerGate::pair();
        let pending = tokio::spawn(op());
        assert!(gate.fail("nope"));
        assert_eq!(pending.await.expect("task ran"), Err("nope".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_gate_fails_op() {
        let (gate, op) = ServerGate::pair();
        drop(gate);
        assert_eq!(op().await, Err("gate dropped".to_string()));
    }

    #[tokio::test]
    async fn test_recording_refresh_counts_calls() {
        let recorder = RecordingRefresh::failing("boom");
        let callback = recorder.callback();
        assert!(callback().await.is_err());
        assert!(callback().await.is_err());
        assert_eq!(recorder.count(), 2);
    }

    #[test]
    fn test_open_inbox_fixture() {
        let items = fixtures::open_inbox(3);
        assert_eq!(items.len(), 3);
        assertions::assert_status(&items, "c2", "open");
    }
}
