//! Event infrastructure for quote-core.
//!
//! Provides `QuoteEvent` notifications for the presentation layer and
//! `EventBus` for subscriptions. Wrap the bus in `Arc` to subscribe.

use crate::reconcile::SyncSummary;

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Notifications emitted by the session after state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QuoteEvent {
    /// A quote was added locally.
    QuoteAdded {
        #[serde(rename = "localId")]
        local_id: String,
        category: String,
    },
    /// A quote was deleted by the user.
    QuoteRemoved {
        #[serde(rename = "localId")]
        local_id: String,
    },
    /// Quotes were appended from an import file.
    QuotesImported { count: usize },
    /// A reconciliation pass started.
    SyncStarted {
        /// When the pass started, in milliseconds since Unix epoch.
        timestamp: u64,
    },
    /// A pass overwrote local records with remote versions.
    ConflictsDetected { count: usize },
    /// A pass finished.
    SyncCompleted {
        summary: SyncSummary,
        timestamp: u64,
    },
    /// A pass was abandoned because the remote list couldn't be fetched.
    SyncFailed { reason: String, timestamp: u64 },
    /// A conflict was manually reverted to the local version.
    ConflictReverted {
        index: usize,
        #[serde(rename = "localId")]
        local_id: String,
    },
    /// The category filter changed.
    FilterChanged { filter: String },
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(&QuoteEvent) + Send + Sync>;

/// Event bus for publishing quote events to subscribers.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&QuoteEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // emit() clones the callback list before calling out, so no lock is
        // held while a subscriber runs and waiting here cannot deadlock.
        // While unwinding, skip rather than risk a second panic.
        let mut callbacks = if std::thread::panicking() {
            match self.callbacks.try_write() {
                Ok(guard) => guard,
                Err(_) => return,
            }
        } else {
            self.callbacks.write().unwrap_or_else(|e| e.into_inner())
        };
        callbacks.retain(|(i, _)| *i != id);
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: QuoteEvent) {
        // Clone the list so a callback may subscribe without deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(&event);
        }
    }
}
