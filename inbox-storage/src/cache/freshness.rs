//! Cache reads carrying age metadata.

use std::time::Duration;
use tokio::time::Instant;

/// Result of a cache hit, carrying when the value was derived.
///
/// Callers that only need the value use [`ArtifactCache::get`]; this wrapper
/// is for callers that also want to show or act on the entry's age.
///
/// [`ArtifactCache::get`]: super::ArtifactCache::get
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The cached value.
    value: T,
    /// When the entry was stored.
    created_at: Instant,
    /// Time-to-live the entry was read under.
    ttl: Duration,
}

impl<T> CacheRead<T> {
    pub(crate) fn new(value: T, created_at: Instant, ttl: Duration) -> Self {
        Self {
            value,
            created_at,
            ttl,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// How long ago the entry was stored.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.created_at)
    }

    /// Time left before the entry expires, zero once it has.
    pub fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.age())
    }

    /// Get when this value was stored.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            created_at: self.created_at,
            ttl: self.ttl,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
