//! One live view of the conversations feed.
//!
//! A session owns the observable collection, keeps it fresh through a
//! coalesced subscription, routes user edits through the optimistic tracker,
//! and carries the artifact cache for expensive per-document derivations.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use inbox_core::{Record, SyncResult};
use inbox_events::{ChangeFilter, EventSource};
use inbox_storage::{ArtifactCache, ItemCollection, SharedCollection};
use tracing::{info, warn};

use crate::coalescer::{ChangeCoalescer, Subscription};
use crate::config::SyncConfig;
use crate::tracker::OptimisticTracker;

/// Resource name of the conversations feed.
pub const CONVERSATIONS: &str = "conversations";

pub struct SyncSession<T: Record + PartialEq> {
    config: SyncConfig,
    collection: SharedCollection<T>,
    tracker: OptimisticTracker<T, SharedCollection<T>>,
    cache: Arc<ArtifactCache<String>>,
    subscription: Subscription,
}

impl<T: Record + PartialEq> std::fmt::Debug for SyncSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Record + PartialEq> SyncSession<T> {
    /// Validate `config`, seed the collection with `initial`, and subscribe
    /// to changes on [`CONVERSATIONS`].
    ///
    /// Every coalesced refresh awaits `fetch` and swaps its result in as the
    /// new collection. A failed fetch leaves the collection untouched.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut, E>(
        config: SyncConfig,
        source: Arc<dyn EventSource>,
        initial: Vec<T>,
        fetch: F,
    ) -> SyncResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        config.validate()?;
        let coalescer = ChangeCoalescer::new(config.coalescer_config())?;
        let cache = Arc::new(ArtifactCache::new(config.cache_config())?);

        let collection = SharedCollection::new(initial);
        let tracker = OptimisticTracker::new(collection.clone(), config.tracker_config());

        let target = collection.clone();
        let subscription = coalescer.subscribe(
            source,
            &ChangeFilter::resource(CONVERSATIONS),
            move || {
                let fetched = fetch();
                let target = target.clone();
                async move {
                    let items = fetched.await.map_err(|err| {
                        warn!(error = %err, "Conversation fetch failed");
                        err
                    })?;
                    let count = items.len();
                    target.replace(items);
                    info!(count, "Conversations refreshed");
                    Ok::<(), E>(())
                }
            },
        )?;

        info!(resource = CONVERSATIONS, "Sync session started");
        Ok(Self {
            config,
            collection,
            tracker,
            cache,
            subscription,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The observable collection; clone it or `subscribe()` to follow swaps.
    pub fn collection(&self) -> &SharedCollection<T> {
        &self.collection
    }

    pub fn items(&self) -> Arc<Vec<T>> {
        self.collection.items()
    }

    pub fn tracker(&self) -> &OptimisticTracker<T, SharedCollection<T>> {
        &self.tracker
    }

    pub fn cache(&self) -> &Arc<ArtifactCache<String>> {
        &self.cache
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Request a refresh as if the feed had reported a change.
    pub fn notify(&self) {
        self.subscription.notify();
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop listening for changes. Pending mutations still settle.
    pub fn shutdown(&self) {
        if self.subscription.is_active() {
            info!(resource = CONVERSATIONS, "Sync session shutting down");
        }
        self.subscription.unsubscribe();
    }
}
