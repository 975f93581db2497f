use super::backend::EntitlementBackend;
use super::events::{EntitlementEvent, EventHandler, ListenerId};
use super::limits::{self, BlockReason, LimitDecision};
use super::SubscriptionSnapshot;
use crate::error::EntitlementError;
use crate::notifications::{Notice, NoticeLevel, Notifier};
use crate::session::{SessionStorage, TrialMarker, FREE_TRIAL_MODAL_KEY};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

/// Visibility of the free-trial prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialModalState {
    pub shown: bool,
}

/// Everything consumers read from the store
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    /// Last applied snapshot; `None` until the first successful fetch.
    pub snapshot: Option<SubscriptionSnapshot>,
    pub trial_modal: TrialModalState,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pending_loads: usize,
    applied_sequence: u64,
}

impl StoreState {
    /// True while a non-silent fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.pending_loads > 0
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    /// `None` while nothing has been loaded.
    pub fn has_subscription(&self) -> Option<bool> {
        self.snapshot.as_ref().map(SubscriptionSnapshot::has_subscription)
    }
}

/// Owns the organization's entitlement snapshot and the free-trial workflow.
///
/// Construct one per application root and share it behind an `Arc`. Only the
/// store writes its state; every other component reads it or subscribes to
/// [`EntitlementEvent`]s. Backend failures never escape: they become
/// notifications and the previous snapshot stays in place.
pub struct SubscriptionStore {
    backend: Arc<dyn EntitlementBackend>,
    session: Arc<dyn SessionStorage>,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<StoreState>>,
    events: EventHandler,
    mounted: OnceCell<()>,
    fetch_sequence: AtomicU64,
    trial_in_flight: AtomicBool,
}

impl SubscriptionStore {
    pub fn new(
        backend: Arc<dyn EntitlementBackend>,
        session: Arc<dyn SessionStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            session,
            notifier,
            state: Arc::new(RwLock::new(StoreState::default())),
            events: EventHandler::new(),
            mounted: OnceCell::new(),
            fetch_sequence: AtomicU64::new(0),
            trial_in_flight: AtomicBool::new(false),
        }
    }

    /// Run the initial blocking fetch. Only the first call per store that finds
    /// an organization in the session fetches; concurrent and later calls wait
    /// for it and return the current snapshot. Until an organization appears,
    /// every call is a no-op that leaves the store unmounted.
    pub async fn mount(&self) -> Option<SubscriptionSnapshot> {
        let mounted = self
            .mounted
            .get_or_try_init(|| async {
                if self.session.organization_id().is_none() {
                    return Err(());
                }
                debug!("Mounting subscription store");
                self.fetch_snapshot(false).await;
                Ok(())
            })
            .await;
        if mounted.is_err() {
            debug!("No organization in session yet, deferring initial subscription fetch");
        }
        self.snapshot().await
    }

    /// Fetch the organization's status and replace the snapshot.
    ///
    /// Returns the snapshot now in place, or `None` when nothing was fetched
    /// (no organization in the session, or the request failed). A silent fetch
    /// does not raise the loading flag.
    pub async fn fetch_snapshot(&self, silent: bool) -> Option<SubscriptionSnapshot> {
        let Some(organization_id) = self.session.organization_id() else {
            debug!("No organization in session, skipping subscription fetch");
            return None;
        };

        let sequence = self.fetch_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if !silent {
            self.state.write().await.pending_loads += 1;
        }
        debug!("Fetching subscription snapshot #{} (silent={})", sequence, silent);

        let result = self.backend.fetch_status(&organization_id).await;

        let mut state = self.state.write().await;
        if !silent {
            state.pending_loads = state.pending_loads.saturating_sub(1);
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                drop(state);
                warn!("Failed to load subscription for {}: {}", organization_id, e);
                let message = e.user_message();
                self.notifier.notify(Notice::transient(
                    NoticeLevel::Error,
                    "Subscription unavailable",
                    &message,
                ));
                self.events.emit(EntitlementEvent::FetchFailed { message }).await;
                return None;
            }
        };

        // A newer fetch already landed; this response is out of date.
        if sequence < state.applied_sequence {
            debug!(
                "Discarding snapshot #{}, #{} already applied",
                sequence, state.applied_sequence
            );
            return state.snapshot.clone();
        }

        state.applied_sequence = sequence;
        state.snapshot = Some(snapshot.clone());
        state.last_fetched_at = Some(Utc::now());

        let show_trial_modal = !snapshot.has_subscription()
            && !state.trial_modal.shown
            && !self.session.trial_marker_present();
        if show_trial_modal {
            state.trial_modal.shown = true;
        }
        drop(state);

        info!(
            "Subscription snapshot updated: active={}, {} limits",
            snapshot.has_subscription(),
            snapshot.limits.len()
        );

        if show_trial_modal {
            self.write_trial_marker(TrialMarker::Shown);
            info!("No active plan, offering free trial");
        }

        self.events
            .emit(EntitlementEvent::SnapshotUpdated(snapshot.clone()))
            .await;
        if show_trial_modal {
            self.events
                .emit(EntitlementEvent::TrialModalChanged { visible: true })
                .await;
        }

        Some(snapshot)
    }

    /// Silent re-fetch after a gated resource was created or deleted.
    pub async fn refresh_after_mutation(&self) {
        self.fetch_snapshot(true).await;
    }

    /// Activate a free trial for the organization.
    ///
    /// Returns true on success. A call made while another activation is still
    /// in flight does nothing and returns false.
    pub async fn start_trial(&self) -> bool {
        if self.trial_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Free trial activation already in progress");
            return false;
        }

        let activated = self.activate_trial().await;
        self.trial_in_flight.store(false, Ordering::SeqCst);
        activated
    }

    async fn activate_trial(&self) -> bool {
        let Some(organization_id) = self.session.organization_id() else {
            warn!("Cannot start free trial without an organization");
            self.notifier.notify(Notice::transient(
                NoticeLevel::Error,
                "Could not start free trial",
                &EntitlementError::MissingOrganization.user_message(),
            ));
            return false;
        };

        if let Err(e) = self.backend.activate_free_trial(&organization_id).await {
            error!("Free trial activation failed for {}: {}", organization_id, e);
            self.notifier.notify(Notice::transient(
                NoticeLevel::Error,
                "Could not start free trial",
                &e.user_message(),
            ));
            return false;
        }

        info!("Free trial activated for {}", organization_id);
        self.write_trial_marker(TrialMarker::Activated);
        self.set_trial_modal_visible(false).await;
        self.notifier.notify(Notice::transient(
            NoticeLevel::Success,
            "Free trial started",
            "Your free trial is now active",
        ));

        self.fetch_snapshot(false).await;
        self.events.emit(EntitlementEvent::TrialActivated).await;
        true
    }

    /// Close the free-trial prompt without starting a trial.
    ///
    /// The prompt stays suppressed for the rest of the session.
    pub async fn dismiss_trial_modal(&self) {
        if self.session.get(FREE_TRIAL_MODAL_KEY).as_deref() != Some(TrialMarker::Activated.as_str()) {
            self.write_trial_marker(TrialMarker::Dismissed);
        }
        self.set_trial_modal_visible(false).await;
    }

    async fn set_trial_modal_visible(&self, visible: bool) {
        let changed = {
            let mut state = self.state.write().await;
            let changed = state.trial_modal.shown != visible;
            state.trial_modal.shown = visible;
            changed
        };
        if changed {
            self.events
                .emit(EntitlementEvent::TrialModalChanged { visible })
                .await;
        }
    }

    fn write_trial_marker(&self, marker: TrialMarker) {
        if let Err(e) = self.session.set(FREE_TRIAL_MODAL_KEY, marker.as_str()) {
            warn!("Failed to record free trial marker: {}", e);
        }
    }

    /// Gate a create action for `resource`.
    ///
    /// Returns false and shows a blocking notice when the plan does not allow
    /// another one; the caller should abort the action.
    pub async fn check_limit(&self, resource: impl AsRef<str>) -> bool {
        let resource = resource.as_ref();
        let decision = self.limit_decision(resource).await;

        match decision {
            LimitDecision::Blocked { reason, message } => {
                info!("Blocked creating {}: {:?}", resource, reason);
                let title = match reason {
                    BlockReason::NotLoaded => "Please wait",
                    BlockReason::NoSubscription => "Subscription required",
                    BlockReason::UnknownResource | BlockReason::LimitReached { .. } => {
                        "Plan limit reached"
                    }
                };
                self.notifier
                    .notify(Notice::blocking(NoticeLevel::Warning, title, &message));
                false
            }
            LimitDecision::AllowedWithWarning { warning } => {
                debug!("Allowing {} near its limit: {}", resource, warning);
                true
            }
            LimitDecision::Allowed => true,
        }
    }

    /// Limit decision for `resource` without notifying anyone.
    pub async fn limit_decision(&self, resource: &str) -> LimitDecision {
        let state = self.state.read().await;
        limits::evaluate(state.snapshot.as_ref(), resource)
    }

    pub async fn state(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub async fn snapshot(&self) -> Option<SubscriptionSnapshot> {
        self.state.read().await.snapshot.clone()
    }

    pub async fn has_subscription(&self) -> Option<bool> {
        self.state.read().await.has_subscription()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading()
    }

    pub async fn trial_modal(&self) -> TrialModalState {
        self.state.read().await.trial_modal
    }

    pub fn session(&self) -> &Arc<dyn SessionStorage> {
        &self.session
    }

    pub fn events(&self) -> &EventHandler {
        &self.events
    }

    /// Register a callback for every store event
    pub async fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&EntitlementEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback).await
    }

    /// Register a callback fired once per successful trial activation
    pub async fn on_trial_activated<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_trial_activated(callback).await
    }

    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id).await
    }
}
