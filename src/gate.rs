//! Route guard deciding whether a dashboard route renders, waits or redirects.
//!
//! Two layers: without an organization in the session everything but the
//! public routes goes to the login page; without an active plan everything but
//! the exempt routes goes to the subscription page.

use crate::config::ClientConfig;
use crate::payment::{StoreState, SubscriptionStore};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// A blocking fetch is in flight or nothing has loaded yet.
    Loading,
    /// Loaded, and the organization has no active plan.
    Blocked,
    /// Loaded, and the organization has an active plan.
    Allowed,
}

impl GateState {
    pub fn from_store(state: &StoreState) -> Self {
        if state.is_loading() {
            return Self::Loading;
        }
        match state.has_subscription() {
            None => Self::Loading,
            Some(false) => Self::Blocked,
            Some(true) => Self::Allowed,
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "LOADING",
            Self::Blocked => "BLOCKED",
            Self::Allowed => "ALLOWED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Login,
    Subscribe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    ShowLoading,
    Redirect { target: RedirectTarget, path: String },
}

impl RouteDecision {
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}

/// What the application root should display for a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateView {
    pub state: GateState,
    pub decision: RouteDecision,
    /// The free-trial overlay is independent of the route decision.
    pub show_trial_modal: bool,
}

pub struct AccessGate {
    login_path: String,
    subscribe_path: String,
    public_routes: Vec<String>,
    exempt_routes: Vec<String>,
}

impl AccessGate {
    pub fn new(
        login_path: &str,
        subscribe_path: &str,
        public_routes: &[String],
        exempt_routes: &[String],
    ) -> Self {
        let login_path = normalize_route(login_path);
        let subscribe_path = normalize_route(subscribe_path);

        // The redirect targets must never redirect to themselves.
        let mut public_routes: Vec<String> = public_routes.iter().map(|r| normalize_route(r)).collect();
        if !public_routes.contains(&login_path) {
            public_routes.push(login_path.clone());
        }
        let mut exempt_routes: Vec<String> = exempt_routes.iter().map(|r| normalize_route(r)).collect();
        if !exempt_routes.contains(&subscribe_path) {
            exempt_routes.push(subscribe_path.clone());
        }

        Self {
            login_path,
            subscribe_path,
            public_routes,
            exempt_routes,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            &config.login_path,
            &config.subscribe_path,
            &config.public_routes,
            &config.exempt_routes,
        )
    }

    pub fn is_public(&self, route: &str) -> bool {
        let path = normalize_route(route);
        self.public_routes.iter().any(|r| route_matches(&path, r))
    }

    pub fn is_exempt(&self, route: &str) -> bool {
        let path = normalize_route(route);
        self.exempt_routes.iter().any(|r| route_matches(&path, r))
    }

    /// Decide for `route` given session presence and gate state.
    pub fn decide(&self, route: &str, authenticated: bool, state: GateState) -> RouteDecision {
        if !authenticated {
            if self.is_public(route) {
                return RouteDecision::Render;
            }
            return RouteDecision::Redirect {
                target: RedirectTarget::Login,
                path: self.login_path.clone(),
            };
        }

        if self.is_exempt(route) || self.is_public(route) {
            return RouteDecision::Render;
        }

        match state {
            GateState::Loading => RouteDecision::ShowLoading,
            GateState::Blocked => RouteDecision::Redirect {
                target: RedirectTarget::Subscribe,
                path: self.subscribe_path.clone(),
            },
            GateState::Allowed => RouteDecision::Render,
        }
    }

    /// Evaluate `route` against the store's current state.
    pub async fn view(&self, store: &SubscriptionStore, route: &str) -> GateView {
        let authenticated = store.session().organization_id().is_some();
        let store_state = store.state().await;
        let state = GateState::from_store(&store_state);
        let decision = self.decide(route, authenticated, state);
        debug!("Gate {} for {}: {:?}", state, route, decision);

        GateView {
            state,
            decision,
            show_trial_modal: store_state.trial_modal.shown,
        }
    }

    pub fn subscribe_path(&self) -> &str {
        &self.subscribe_path
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Strip query and fragment, force a leading slash, drop trailing slashes.
pub fn normalize_route(route: &str) -> String {
    let path = route
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

// Exact match, or `allowed` is a whole-segment prefix of `path`.
fn route_matches(path: &str, allowed: &str) -> bool {
    if path == allowed {
        return true;
    }
    allowed != "/"
        && path.len() > allowed.len()
        && path.starts_with(allowed)
        && path.as_bytes()[allowed.len()] == b'/'
}
