//! Fan-out of [`AuthStateChanged`] events.
//!
//! Observers registered with [`AuthNotifier::subscribe`] are called
//! synchronously on the thread that performed the transition. Async
//! consumers can instead take a broadcast receiver from
//! [`AuthNotifier::watch`]; events are queued on it before the
//! transition returns.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::broadcast;
use tracing::debug;

use super::state::AuthStateChanged;

/// Capacity of the broadcast channel handed out by `watch`
const WATCH_CHANNEL_CAPACITY: usize = 16;

type Observer = Arc<dyn Fn(&AuthStateChanged) + Send + Sync>;

struct Registry {
    next_id: AtomicU64,
    observers: RwLock<BTreeMap<u64, Observer>>,
}

pub struct AuthNotifier {
    registry: Arc<Registry>,
    tx: broadcast::Sender<AuthStateChanged>,
}

impl Default for AuthNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                observers: RwLock::new(BTreeMap::new()),
            }),
            tx,
        }
    }

    /// Register `observer` until the returned handle is dropped or cancelled.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&AuthStateChanged) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Arc::new(observer));
        debug!(id, "Auth observer registered");
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Receiver that sees every event posted after this call.
    pub fn watch(&self) -> broadcast::Receiver<AuthStateChanged> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.registry
            .observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub(crate) fn post(&self, change: &AuthStateChanged) {
        // Snapshot so observers may (un)subscribe from inside a callback.
        let observers: Vec<Observer> = self
            .registry
            .observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();

        debug!(
            login = %change.login,
            state = %change.state,
            previous = %change.previous,
            observers = observers.len(),
            "Posting auth state change"
        );

        for observer in observers {
            observer(change);
        }

        // No receivers is not an error.
        let _ = self.tx.send(change.clone());
    }
}

/// Handle returned by [`AuthNotifier::subscribe`].
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .observers
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&self.id);
        }
    }
}
