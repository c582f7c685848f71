//! Inbox Sync - Client-Side Synchronization Core
//!
//! Keeps a locally held view of the conversations feed fresh against a live
//! backend while tolerating bursty change notifications, and reconciles
//! optimistic local edits with eventual server confirmation.
//!
//! ```text
//! EventSource ──signal──▶ ChangeCoalescer ──refresh──▶ fetch ──▶ SharedCollection
//!                                                                   ▲
//! user edit ──▶ OptimisticTracker ──merge (immediate)───────────────┘
//!                      └──server op (spawned)──▶ settle ──▶ pending set / failures
//! ```
//!
//! # Components
//!
//! - [`coalescer`]: floor + trailing debounce over raw change signals
//! - [`tracker`]: optimistic patch, pending set, failure channel
//! - [`session`]: wiring for one live conversations view
//! - [`config`]: TOML configuration
//! - [`telemetry`]: tracing subscriber setup
//!
//! The derived-artifact cache lives in `inbox-storage` and is re-exported
//! here.

pub mod coalescer;
pub mod config;
pub mod session;
pub mod telemetry;
pub mod tracker;

pub use coalescer::{
    ChangeCoalescer, CoalescerConfig, CoalescerState, CoalescerStats, Phase, SignalDecision,
    Subscription, MAX_INTERVAL,
};
pub use config::SyncConfig;
pub use session::{SyncSession, CONVERSATIONS};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use tracker::{
    MutationFailure, MutationHandle, MutationOrdering, OptimisticTracker, RevertPolicy,
    TrackerConfig,
};

pub use inbox_core::{
    ConfigError, EventSourceError, Item, ItemId, ItemPatch, MutationError, Record, SyncError,
    SyncResult,
};
pub use inbox_events::{ChangeEvent, ChangeFilter, ChangeKind, EventSource, InMemoryEventSource};
pub use inbox_storage::{
    ArtifactCache, CacheConfig, CacheRead, CacheStats, ItemCollection, SharedCollection,
};
