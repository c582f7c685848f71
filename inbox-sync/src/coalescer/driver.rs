//! Async driver for the coalescing state machine.
//!
//! One tokio task per subscription owns a [`CoalescerState`], receives
//! timestamped signals over a channel, and sleeps until the armed deadline.
//! Refresh callbacks are spawned per emission and never awaited by the
//! driver, so a slow or failing callback cannot hold back the next one.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use inbox_core::{ChangeSignal, ConfigError, SyncResult};
use inbox_events::{ChangeFilter, ChangeHandler, EventSource, SubscriptionToken};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::state::{CoalescerConfig, CoalescerState, SignalDecision};

type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Counters describing what a subscription did with its signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Raw signals received.
    pub signals: u64,
    /// Signals discarded by the floor.
    pub dropped_by_floor: u64,
    /// Signals that reset an already-armed debounce timer.
    pub rearmed: u64,
    /// Refresh callbacks emitted.
    pub emitted: u64,
}

#[derive(Debug, Default)]
struct Shared {
    active: AtomicBool,
    signals: AtomicU64,
    dropped_by_floor: AtomicU64,
    rearmed: AtomicU64,
    emitted: AtomicU64,
}

impl Shared {
    fn snapshot(&self) -> CoalescerStats {
        CoalescerStats {
            signals: self.signals.load(Ordering::Relaxed),
            dropped_by_floor: self.dropped_by_floor.load(Ordering::Relaxed),
            rearmed: self.rearmed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
        }
    }
}

/// Factory for coalesced refresh subscriptions.
#[derive(Debug, Clone, Default)]
pub struct ChangeCoalescer {
    config: CoalescerConfig,
}

impl ChangeCoalescer {
    /// Create a coalescer, rejecting zero intervals.
    pub fn new(config: CoalescerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    /// Listen to `source` for changes matching `filter` and call
    /// `on_refresh` at a coalesced rate.
    ///
    /// Must be called from within a tokio runtime. Errors returned by
    /// `on_refresh` are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the event source refuses the subscription.
    pub fn subscribe<F, Fut, E>(
        &self,
        source: Arc<dyn EventSource>,
        filter: &ChangeFilter,
        on_refresh: F,
    ) -> SyncResult<Subscription>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut subscription = self.detached(on_refresh);

        let tx = subscription.tx.clone();
        let handler: ChangeHandler = Arc::new(move |_signal: ChangeSignal| {
            // Stamp at arrival so queueing delay never shifts the deadline.
            let _ = tx.send(Instant::now());
        });

        match source.subscribe(filter, handler) {
            Ok(token) => {
                info!(%token, resource = %filter.resource, "Coalesced refresh subscription started");
                subscription.source = Some((source, token));
                Ok(subscription)
            }
            Err(err) => {
                subscription.unsubscribe();
                Err(err.into())
            }
        }
    }

    /// A subscription with no event source attached; signals arrive only
    /// through [`Subscription::notify`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn detached<F, Fut, E>(&self, on_refresh: F) -> Subscription
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let refresh: RefreshFn = Arc::new(move || {
            let fut = on_refresh();
            async move { fut.await.map_err(|err| err.to_string()) }.boxed()
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared::default());
        shared.active.store(true, Ordering::SeqCst);

        tokio::spawn(drive(
            CoalescerState::new(self.config),
            rx,
            cancel.clone(),
            shared.clone(),
            refresh,
        ));

        Subscription {
            tx,
            cancel,
            shared,
            source: None,
        }
    }
}

/// Handle to one active coalesced subscription.
///
/// Dropping the handle tears the subscription down.
pub struct Subscription {
    tx: mpsc::UnboundedSender<Instant>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    source: Option<(Arc<dyn EventSource>, SubscriptionToken)>,
}

impl Subscription {
    /// Feed one raw change signal.
    pub fn notify(&self) {
        if self.is_active() {
            let _ = self.tx.send(Instant::now());
        }
    }

    /// Cancel any armed timer, release the event-source handle, and stop
    /// emitting. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.shared.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if let Some((source, token)) = &self.source {
            if let Err(err) = source.unsubscribe(*token) {
                debug!(%token, error = %err, "Event source already released subscription");
            }
        }
        info!("Coalesced refresh subscription stopped");
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Event-source token, if attached to a source.
    pub fn token(&self) -> Option<SubscriptionToken> {
        self.source.as_ref().map(|(_, token)| *token)
    }

    pub fn stats(&self) -> CoalescerStats {
        self.shared.snapshot()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .field("token", &self.token())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn drive(
    mut state: CoalescerState,
    mut signals: mpsc::UnboundedReceiver<Instant>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    refresh: RefreshFn,
) {
    loop {
        if let Some((deadline, generation)) = state.armed() {
            let now = Instant::now();
            if now >= deadline {
                // Teardown may race the timer; the flag is authoritative.
                if !shared.active.load(Ordering::SeqCst) {
                    break;
                }
                if state.on_deadline(now, generation) {
                    emit(&shared, &refresh);
                }
                continue;
            }
        }

        let armed = state.armed();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = async {
                match armed {
                    Some((deadline, _)) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {}
            signal = signals.recv() => match signal {
                Some(at) => on_signal(&mut state, &shared, at),
                None => break,
            },
        }
    }
    state.deactivate();
    trace!("Coalescer driver exited");
}

fn on_signal(state: &mut CoalescerState, shared: &Shared, at: Instant) {
    shared.signals.fetch_add(1, Ordering::Relaxed);
    match state.on_signal(at) {
        SignalDecision::Dropped { retry_after } => {
            shared.dropped_by_floor.fetch_add(1, Ordering::Relaxed);
            trace!(?retry_after, "Change signal dropped by refresh floor");
        }
        SignalDecision::Armed {
            generation,
            rearmed,
            ..
        } => {
            if rearmed {
                shared.rearmed.fetch_add(1, Ordering::Relaxed);
            }
            trace!(generation, rearmed, "Debounce timer armed");
        }
        SignalDecision::Unschedulable => {
            warn!(?at, "Debounce deadline out of range; change signal ignored");
        }
        SignalDecision::Inactive => {}
    }
}

fn emit(shared: &Shared, refresh: &RefreshFn) {
    let emitted = shared.emitted.fetch_add(1, Ordering::Relaxed) + 1;
    info!(emitted, "Emitting coalesced refresh");

    let refresh = refresh.clone();
    tokio::spawn(async move {
        if let Err(err) = refresh().await {
            warn!(error = %err, "Refresh callback failed");
        }
    });
}
