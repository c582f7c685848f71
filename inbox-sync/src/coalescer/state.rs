//! Pure coalescing state machine.
//!
//! No timers and no clock reads: every transition takes `now` from the
//! caller. The async driver feeds it real (or paused) tokio time; tests can
//! drive it directly with synthetic instants.
//!
//! ```text
//!            signal (floor ok)            deadline reached
//!   Idle ───────────────────────▶ Armed ───────────────────▶ Emitted
//!                                  │  ▲                         │
//!                                  └──┘ signal: re-arm          │ signal (floor ok)
//!                                                               ▼
//!                                                             Armed
//! ```

use std::time::Duration;

use inbox_core::ConfigError;
use tokio::time::Instant;

/// Upper bound accepted for either coalescer duration.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing policy for the coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Minimum gap between two emitted refreshes. Signals arriving sooner
    /// than this after the last refresh are dropped outright.
    pub min_interval: Duration,
    /// Quiet period after the last signal before a refresh is emitted.
    pub debounce_window: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(8),
            debounce_window: Duration::from_secs(3),
        }
    }
}

impl CoalescerConfig {
    pub fn new(min_interval: Duration, debounce_window: Duration) -> Self {
        Self {
            min_interval,
            debounce_window,
        }
    }

    /// Rejects zero durations and durations above [`MAX_INTERVAL`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_interval("coalescer.min_interval", self.min_interval)?;
        check_interval("coalescer.debounce_window", self.debounce_window)
    }
}

fn check_interval(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::invalid(field, "must be > 0"));
    }
    if value > MAX_INTERVAL {
        return Err(ConfigError::invalid(
            field,
            format!("must be <= {}s", MAX_INTERVAL.as_secs()),
        ));
    }
    Ok(())
}

/// Where the coalescer currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing armed, nothing emitted yet.
    Idle,
    /// A refresh is scheduled for `deadline`. Only a deadline carrying the
    /// same `generation` may fire it.
    Armed { deadline: Instant, generation: u64 },
    /// The last armed timer fired and a refresh went out.
    Emitted,
}

/// Outcome of feeding one signal to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDecision {
    /// Dropped by the floor; no timer armed. `retry_after` is how long until
    /// the floor lifts.
    Dropped { retry_after: Duration },
    /// The debounce timer is (re)armed.
    Armed {
        deadline: Instant,
        generation: u64,
        /// True when this signal replaced an already-armed timer.
        rearmed: bool,
    },
    /// `now + debounce_window` is not a representable instant; the signal
    /// is ignored. Only reachable with an unvalidated config.
    Unschedulable,
    /// The subscription has been torn down.
    Inactive,
}

/// Floor + debounce bookkeeping for one subscription.
#[derive(Debug, Clone)]
pub struct CoalescerState {
    config: CoalescerConfig,
    phase: Phase,
    last_emit: Option<Instant>,
    generation: u64,
    active: bool,
}

impl CoalescerState {
    pub fn new(config: CoalescerConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            last_emit: None,
            generation: 0,
            active: true,
        }
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_emit(&self) -> Option<Instant> {
        self.last_emit
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The pending deadline and its generation, if armed.
    pub fn armed(&self) -> Option<(Instant, u64)> {
        match self.phase {
            Phase::Armed {
                deadline,
                generation,
            } => Some((deadline, generation)),
            _ => None,
        }
    }

    /// Feed one raw change signal observed at `now`.
    pub fn on_signal(&mut self, now: Instant) -> SignalDecision {
        if !self.active {
            return SignalDecision::Inactive;
        }

        if let Some(last) = self.last_emit {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.config.min_interval {
                return SignalDecision::Dropped {
                    retry_after: self.config.min_interval - elapsed,
                };
            }
        }

        let Some(deadline) = now.checked_add(self.config.debounce_window) else {
            return SignalDecision::Unschedulable;
        };
        let rearmed = matches!(self.phase, Phase::Armed { .. });
        self.generation += 1;
        self.phase = Phase::Armed {
            deadline,
            generation: self.generation,
        };
        SignalDecision::Armed {
            deadline,
            generation: self.generation,
            rearmed,
        }
    }

    /// A timer armed for `generation` fired at `now`.
    ///
    /// Returns true when a refresh must be emitted. Superseded generations,
    /// early wake-ups, and torn-down subscriptions all return false.
    pub fn on_deadline(&mut self, now: Instant, generation: u64) -> bool {
        if !self.active {
            return false;
        }
        match self.phase {
            Phase::Armed {
                deadline,
                generation: current,
            } if current == generation && now >= deadline => {
                self.last_emit = Some(now);
                self.phase = Phase::Emitted;
                true
            }
            _ => false,
        }
    }

    /// Tear down: any armed deadline becomes a no-op.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.phase = Phase::Idle;
    }
}
