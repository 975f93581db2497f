use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::SubscriptionSnapshot;

/// Notifications published by the subscription store
#[derive(Debug, Clone, PartialEq)]
pub enum EntitlementEvent {
    /// A fetch completed and replaced the snapshot.
    SnapshotUpdated(SubscriptionSnapshot),
    /// The free-trial prompt was shown or hidden.
    TrialModalChanged { visible: bool },
    /// A free trial was activated. Views holding their own plan data should re-fetch.
    TrialActivated,
    /// A fetch failed; the previous snapshot is still in place.
    FetchFailed { message: String },
}

/// Handle returned on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type EventCallback = Arc<dyn Fn(&EntitlementEvent) + Send + Sync>;

/// Listener registry owned by the store
pub struct EventHandler {
    listeners: Arc<RwLock<Vec<(ListenerId, EventCallback)>>>,
    next_id: AtomicU64,
}

impl EventHandler {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for every store event
    pub async fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&EntitlementEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().await;
        listeners.push((id, Arc::new(callback)));
        debug!("Registered entitlement listener {:?} ({} total)", id, listeners.len());
        id
    }

    /// Register a callback fired only after a trial is activated
    pub async fn on_trial_activated<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if matches!(event, EntitlementEvent::TrialActivated) {
                callback();
            }
        })
        .await
    }

    /// Remove a listener. Returns false if it was already gone.
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;
        if removed {
            debug!("Removed entitlement listener {:?}", id);
        }
        removed
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Deliver an event to every registered listener
    pub async fn emit(&self, event: EntitlementEvent) {
        // Callbacks run without the lock held so they may (un)register freely.
        let listeners: Vec<EventCallback> = self
            .listeners
            .read()
            .await
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        trace!("Emitting {:?} to {} listeners", event, listeners.len());
        for listener in listeners {
            listener(&event);
        }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
