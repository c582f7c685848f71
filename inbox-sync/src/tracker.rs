//! Optimistic mutation tracker.
//!
//! Applies a patch to the local collection immediately, marks the item as
//! pending, and runs the confirming server operation in the background.
//! Pending status clears when the operation settles, whatever the outcome.
//!
//! Two policies are explicit rather than left to callers:
//!
//! - [`RevertPolicy`]: whether a failed server operation rolls the
//!   optimistic patch back.
//! - [`MutationOrdering`]: whether server operations for the same id may
//!   overlap or run one after another.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use inbox_core::{ItemId, MutationError, Record, Timestamp};
use inbox_storage::ItemCollection;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, warn};

/// Capacity of the failure broadcast channel.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// What to do with an optimistic patch whose server operation failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertPolicy {
    /// Leave the patch in place; the next refresh reconciles.
    #[default]
    Keep,
    /// Restore the item's pre-patch value, unless a later patch has already
    /// replaced the optimistic value.
    Revert,
}

/// How server operations for the same id relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOrdering {
    /// Operations run as soon as they are applied and may overlap. The
    /// visible item reflects the last `apply` call.
    #[default]
    Concurrent,
    /// Operations for one id run strictly in `apply` order; different ids
    /// still proceed independently.
    SerializedPerId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerConfig {
    pub revert: RevertPolicy,
    pub ordering: MutationOrdering,
}

impl TrackerConfig {
    pub fn with_revert(mut self, revert: RevertPolicy) -> Self {
        self.revert = revert;
        self
    }

    pub fn with_ordering(mut self, ordering: MutationOrdering) -> Self {
        self.ordering = ordering;
        self
    }
}

/// Published on the tracker's error channel when a server operation fails.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationFailure {
    pub id: ItemId,
    pub reason: String,
    /// Whether the optimistic patch was rolled back.
    pub reverted: bool,
    pub failed_at: Timestamp,
}

/// Returned by [`OptimisticTracker::apply`].
#[derive(Debug)]
pub struct MutationHandle {
    id: ItemId,
    merged: bool,
    settled: oneshot::Receiver<Result<(), MutationError>>,
}

impl MutationHandle {
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// False when no item with this id was present, so nothing was patched.
    pub fn merged(&self) -> bool {
        self.merged
    }

    /// Wait for the server operation to settle.
    ///
    /// Resolves to [`MutationError::Cancelled`] if the operation panicked or
    /// its task was torn down before reporting.
    pub async fn settled(self) -> Result<(), MutationError> {
        let id = self.id;
        self.settled
            .await
            .unwrap_or(Err(MutationError::Cancelled { id }))
    }
}

/// Per-id FIFO of in-flight server operations.
#[derive(Debug, Default)]
struct SerialQueue {
    next_seq: u64,
    tails: HashMap<ItemId, (u64, oneshot::Receiver<()>)>,
}

struct TrackerInner<T, C> {
    collection: C,
    config: TrackerConfig,
    counts: Mutex<HashMap<ItemId, usize>>,
    pending: watch::Sender<HashSet<ItemId>>,
    queue: Mutex<SerialQueue>,
    failures: broadcast::Sender<MutationFailure>,
    _record: PhantomData<fn() -> T>,
}

/// Applies optimistic patches to a consumer-owned collection.
///
/// Cloning yields another handle to the same tracker. Must be used from
/// within a tokio runtime; server operations are spawned.
pub struct OptimisticTracker<T, C> {
    inner: Arc<TrackerInner<T, C>>,
}

impl<T, C> Clone for OptimisticTracker<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, C> OptimisticTracker<T, C>
where
    T: Record + PartialEq,
    C: ItemCollection<T> + 'static,
{
    pub fn new(collection: C, config: TrackerConfig) -> Self {
        let (pending, _rx) = watch::channel(HashSet::new());
        let (failures, _rx) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TrackerInner {
                collection,
                config,
                counts: Mutex::new(HashMap::new()),
                pending,
                queue: Mutex::new(SerialQueue::default()),
                failures,
                _record: PhantomData,
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn collection(&self) -> &C {
        &self.inner.collection
    }

    /// Patch `id` locally, mark it pending, and dispatch `server_op`.
    ///
    /// The merged collection is visible before this returns. If `id` is not
    /// in the collection the merge is skipped (see
    /// [`MutationHandle::merged`]) but the id is still tracked and the
    /// operation still dispatched, so the caller can surface its outcome.
    pub fn apply<F, Fut, E>(
        &self,
        id: impl Into<ItemId>,
        patch: T::Patch,
        server_op: F,
    ) -> MutationHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let id = id.into();
        let inner = &self.inner;

        let mut previous = None;
        let mut optimistic = None;
        let merged = inner.collection.update(|items| {
            let index = items.iter().position(|item| item.id() == &id)?;
            let mut next = items.to_vec();
            previous = Some(next[index].clone());
            next[index].merge(&patch);
            optimistic = Some(next[index].clone());
            Some(next)
        });
        if merged {
            debug!(id = %id, "Applied optimistic patch");
        } else {
            warn!(id = %id, "Optimistic patch targets an item missing from the collection");
        }

        inner.mark_pending(&id);
        let (turn, prior) = match inner.config.ordering {
            MutationOrdering::Concurrent => (None, None),
            MutationOrdering::SerializedPerId => {
                let Turn { seq, prior, done } = inner.enqueue(&id);
                (Some((seq, done)), prior)
            }
        };
        let pending = PendingGuard {
            inner: inner.clone(),
            id: id.clone(),
            turn,
        };

        let (tx, rx) = oneshot::channel();
        let task_inner = inner.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            if let Some(prior) = prior {
                // Err means the prior op panicked; our turn has come anyway.
                let _ = prior.await;
            }

            let result = match server_op().await {
                Ok(()) => {
                    debug!(id = %task_id, "Server confirmed optimistic patch");
                    Ok(())
                }
                Err(err) => Err(task_inner.fail(&task_id, err.to_string(), previous, optimistic)),
            };

            // Turn and pending status clear before the caller hears the result.
            drop(pending);
            let _ = tx.send(result);
        });

        MutationHandle {
            id,
            merged,
            settled: rx,
        }
    }

    /// Ids with a server operation in flight.
    pub fn pending_updates(&self) -> HashSet<ItemId> {
        self.inner.pending.borrow().clone()
    }

    pub fn is_pending(&self, id: &ItemId) -> bool {
        self.inner.pending.borrow().contains(id)
    }

    /// Receiver notified whenever the pending set changes.
    pub fn subscribe_pending(&self) -> watch::Receiver<HashSet<ItemId>> {
        self.inner.pending.subscribe()
    }

    /// Error channel: one message per failed server operation.
    pub fn failures(&self) -> broadcast::Receiver<MutationFailure> {
        self.inner.failures.subscribe()
    }
}

struct Turn {
    seq: u64,
    prior: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

impl<T, C> TrackerInner<T, C>
where
    T: Record + PartialEq,
    C: ItemCollection<T>,
{
    fn counts(&self) -> MutexGuard<'_, HashMap<ItemId, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_pending(&self, id: &ItemId) {
        let mut counts = self.counts();
        *counts.entry(id.clone()).or_insert(0) += 1;
        self.publish(&counts);
    }

    fn settle(&self, id: &ItemId) {
        let mut counts = self.counts();
        if let Some(count) = counts.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(id);
            }
        }
        self.publish(&counts);
    }

    fn publish(&self, counts: &HashMap<ItemId, usize>) {
        self.pending.send_if_modified(|set| {
            if set.len() == counts.len() && counts.keys().all(|id| set.contains(id)) {
                return false;
            }
            *set = counts.keys().cloned().collect();
            true
        });
    }

    fn enqueue(&self, id: &ItemId) -> Turn {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.next_seq += 1;
        let seq = queue.next_seq;
        let (done, tail) = oneshot::channel();
        let prior = queue
            .tails
            .insert(id.clone(), (seq, tail))
            .map(|(_, rx)| rx);
        Turn { seq, prior, done }
    }

    fn release(&self, id: &ItemId, seq: u64, done: oneshot::Sender<()>) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = done.send(());
        if queue.tails.get(id).is_some_and(|(tail, _)| *tail == seq) {
            queue.tails.remove(id);
        }
    }

    fn fail(
        &self,
        id: &ItemId,
        reason: String,
        previous: Option<T>,
        optimistic: Option<T>,
    ) -> MutationError {
        let reverted = match (self.config.revert, previous, optimistic) {
            (RevertPolicy::Revert, Some(previous), Some(optimistic)) => {
                let reverted = self.collection.update(|items| {
                    let index = items.iter().position(|item| item.id() == id)?;
                    if items[index] != optimistic {
                        return None;
                    }
                    let mut next = items.to_vec();
                    next[index] = previous;
                    Some(next)
                });
                if !reverted {
                    warn!(id = %id, "Skipped revert; item changed after the optimistic patch");
                }
                reverted
            }
            _ => false,
        };

        warn!(id = %id, error = %reason, reverted, "Server rejected optimistic patch");
        let _ = self.failures.send(MutationFailure {
            id: id.clone(),
            reason: reason.clone(),
            reverted,
            failed_at: Utc::now(),
        });
        MutationError::Server {
            id: id.clone(),
            reason,
        }
    }
}

/// Hands the per-id turn to the next operation and clears pending status
/// on drop, including when the operation panics.
struct PendingGuard<T, C>
where
    T: Record + PartialEq,
    C: ItemCollection<T>,
{
    inner: Arc<TrackerInner<T, C>>,
    id: ItemId,
    turn: Option<(u64, oneshot::Sender<()>)>,
}

impl<T, C> Drop for PendingGuard<T, C>
where
    T: Record + PartialEq,
    C: ItemCollection<T>,
{
    fn drop(&mut self) {
        if let Some((seq, done)) = self.turn.take() {
            self.inner.release(&self.id, seq, done);
        }
        self.inner.settle(&self.id);
    }
}
