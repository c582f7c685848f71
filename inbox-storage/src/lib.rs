//! Inbox Storage - Session-Scoped State
//!
//! Everything here lives in memory for the duration of one client session:
//! the derived-artifact cache and the item collections the sync core reads
//! and replaces. Nothing is persisted.

pub mod cache;
pub mod collection;

pub use cache::{ArtifactCache, CacheConfig, CacheRead, CacheStats};
pub use collection::{ItemCollection, SharedCollection};
