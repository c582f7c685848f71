//! In-memory event source.
//!
//! Stands in for the hosted realtime feed in tests and offline sessions.
//! `publish` fans a change out to every subscription whose filter matches.

use crate::source::{ChangeEvent, ChangeFilter, ChangeHandler, EventSource, SubscriptionToken};
use inbox_core::{ChangeSignal, EventSourceError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

struct Registration {
    filter: ChangeFilter,
    handler: ChangeHandler,
}

/// Registry-backed [`EventSource`] with synchronous fan-out.
#[derive(Default)]
pub struct InMemoryEventSource {
    subscriptions: RwLock<HashMap<SubscriptionToken, Registration>>,
    closed: AtomicBool,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every matching subscription.
    ///
    /// Returns the number of handlers invoked. Handlers run after the
    /// registry lock is released, so they may subscribe or unsubscribe.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let handlers: Vec<ChangeHandler> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|registration| registration.filter.matches(event))
            .map(|registration| registration.handler.clone())
            .collect();

        debug!(
            resource = %event.resource,
            kind = ?event.kind,
            receivers = handlers.len(),
            "Publish change event"
        );

        for handler in &handlers {
            handler(ChangeSignal);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop accepting subscriptions and drop every registration.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EventSource for InMemoryEventSource {
    fn subscribe(
        &self,
        filter: &ChangeFilter,
        handler: ChangeHandler,
    ) -> Result<SubscriptionToken, EventSourceError> {
        if self.is_closed() {
            return Err(EventSourceError::Closed);
        }
        if filter.resource.trim().is_empty() {
            return Err(EventSourceError::Rejected {
                reason: "filter resource must not be empty".to_string(),
            });
        }

        let token = SubscriptionToken::new();
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                token,
                Registration {
                    filter: filter.clone(),
                    handler,
                },
            );
        debug!(%token, resource = %filter.resource, "Subscribed to change feed");
        Ok(token)
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), EventSourceError> {
        let removed = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
        match removed {
            Some(_) => {
                debug!(%token, "Unsubscribed from change feed");
                Ok(())
            }
            None => Err(EventSourceError::UnknownSubscription {
                token: token.as_uuid(),
            }),
        }
    }
}
