//! Item collections owned by the consumer.
//!
//! The sync core never mutates a collection in place. It reads a snapshot and
//! swaps in a whole new one, so readers always observe either the old or the
//! new collection and never a half-applied edit.

use std::sync::Arc;
use tokio::sync::watch;

/// Read-then-replace accessor for a consumer-owned collection.
pub trait ItemCollection<T>: Send + Sync {
    /// Current snapshot.
    fn items(&self) -> Arc<Vec<T>>;

    /// Swap in a new collection.
    fn replace(&self, items: Vec<T>);

    /// Derive a new collection from the current one and swap it in.
    ///
    /// `f` returns `None` to leave the collection as it is. Implementations
    /// that can make the read and the swap atomic should override this.
    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&[T]) -> Option<Vec<T>>,
    {
        let current = self.items();
        match f(&current) {
            Some(next) => {
                self.replace(next);
                true
            }
            None => false,
        }
    }
}

/// Observable collection backed by a `watch` channel.
///
/// Cloning yields another handle to the same collection. UI layers call
/// [`subscribe`](Self::subscribe) to be woken on every swap.
#[derive(Debug)]
pub struct SharedCollection<T> {
    tx: Arc<watch::Sender<Arc<Vec<T>>>>,
}

impl<T> Clone for SharedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Default for SharedCollection<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> SharedCollection<T> {
    pub fn new(items: Vec<T>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(items));
        Self { tx: Arc::new(tx) }
    }

    /// Receiver notified whenever the collection is replaced.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<T>>> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }
}

impl<T: Send + Sync> ItemCollection<T> for SharedCollection<T> {
    fn items(&self) -> Arc<Vec<T>> {
        self.tx.borrow().clone()
    }

    fn replace(&self, items: Vec<T>) {
        self.tx.send_replace(Arc::new(items));
    }

    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&[T]) -> Option<Vec<T>>,
    {
        self.tx.send_if_modified(|current| match f(current.as_slice()) {
            Some(next) => {
                *current = Arc::new(next);
                true
            }
            None => false,
        })
    }
}
