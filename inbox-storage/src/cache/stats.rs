//! Cache usage counters.

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups answered from a valid entry.
    pub hits: u64,
    /// Number of lookups that found nothing valid (includes expired).
    pub misses: u64,
    /// Number of entries dropped because their TTL had elapsed.
    pub expired: u64,
    /// Number of entries dropped to stay within capacity.
    pub evictions: u64,
    /// Number of entries currently held, valid or not yet swept.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
