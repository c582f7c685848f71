//! Inbox Events - Change Event Source
//!
//! This crate defines the seam between the sync core and the live backend
//! feed. The backend publishes row-level change events for named logical
//! resources; the core only ever sees them as opaque [`ChangeSignal`]s.
//!
//! ```text
//! backend feed → EventSource → (filter) → ChangeHandler(ChangeSignal) → coalescer
//! ```
//!
//! # Traits
//!
//! - `EventSource`: subscribe/unsubscribe contract for any live feed

mod in_memory;
mod source;

pub use in_memory::InMemoryEventSource;
pub use source::{
    ChangeEvent, ChangeFilter, ChangeHandler, ChangeKind, EventSource, SubscriptionToken,
};

// Re-export core types for convenience
pub use inbox_core::{ChangeSignal, EventSourceError};
