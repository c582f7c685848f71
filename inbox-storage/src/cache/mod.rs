//! Derived-artifact cache with explicit time-to-live.
//!
//! Memoizes expensive, deterministic derivations (rendering a document's
//! pages into images, for example) keyed by source identity. Entries are
//! valid while `now - created_at <= ttl`; expired entries are logically
//! absent and are evicted lazily by the lookup that finds them.
//!
//! # Example
//!
//! ```ignore
//! let cache = ArtifactCache::<String>::new(CacheConfig::default())?;
//!
//! let pages = cache
//!     .get_or_derive(&pdf_url, || render_pages(&pdf_url))
//!     .await?;
//!
//! // Source document replaced upstream
//! cache.invalidate(Some(&pdf_url));
//! ```

pub mod artifact;
pub mod freshness;
pub mod stats;

pub use artifact::{ArtifactCache, CacheConfig};
pub use freshness::CacheRead;
pub use stats::CacheStats;
