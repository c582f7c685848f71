//! Change coalescer.
//!
//! Reduces an unbounded-rate stream of change signals to a bounded-rate
//! stream of refresh callbacks using two independent guards:
//!
//! - **Floor**: a signal arriving less than `min_interval` after the last
//!   emitted refresh is dropped outright, whatever the burst looks like.
//! - **Debounce**: any other signal (re)arms a single timer of
//!   `debounce_window`; the refresh fires once the burst has settled.
//!
//! The decision logic lives in [`CoalescerState`], a pure state machine
//! that takes the current instant as input. [`ChangeCoalescer`] drives it on
//! the tokio clock, which tests pause and advance to run without sleeping.

mod driver;
mod state;

pub use driver::{ChangeCoalescer, CoalescerStats, Subscription};
pub use state::{CoalescerConfig, CoalescerState, Phase, SignalDecision, MAX_INTERVAL};
