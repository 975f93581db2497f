use super::{LimitInfo, SubscriptionSnapshot};
use tracing::debug;

/// Why a create action was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// No snapshot has been fetched yet.
    NotLoaded,
    /// The organization has no active plan.
    NoSubscription,
    /// The plan does not list this resource type.
    UnknownResource,
    /// The backend reported the quota as used up.
    LimitReached { limit: Option<u64>, current: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    /// Action is allowed
    Allowed,
    /// Action is allowed but the quota is nearly used up
    AllowedWithWarning { warning: String },
    /// Action is blocked
    Blocked { reason: BlockReason, message: String },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Blocked { .. })
    }

    pub fn get_message(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::AllowedWithWarning { warning } => Some(warning.as_str()),
            Self::Blocked { message, .. } => Some(message.as_str()),
        }
    }
}

/// Decide whether one more `resource` may be created.
///
/// Pure function of its inputs: the same snapshot always yields the same
/// decision. Counts are never adjusted here; the backend's `allowed` flag is
/// taken as-is and only refreshed by the next fetch.
pub fn evaluate(snapshot: Option<&SubscriptionSnapshot>, resource: &str) -> LimitDecision {
    let label = resource_label(resource);

    let Some(snapshot) = snapshot else {
        return LimitDecision::Blocked {
            reason: BlockReason::NotLoaded,
            message: format!(
                "Your plan details are still loading. Please try adding {} again in a moment.",
                label
            ),
        };
    };

    if !snapshot.has_subscription() {
        return LimitDecision::Blocked {
            reason: BlockReason::NoSubscription,
            message: format!(
                "You need an active subscription to add {}. Choose a plan to continue.",
                label
            ),
        };
    }

    let Some(info) = snapshot.limit_for(resource) else {
        return LimitDecision::Blocked {
            reason: BlockReason::UnknownResource,
            message: format!("Your current plan does not include {}.", label),
        };
    };

    if !info.allowed {
        debug!("Limit reached for {}: {}/{:?}", resource, info.current, info.limit);
        return LimitDecision::Blocked {
            reason: BlockReason::LimitReached {
                limit: info.limit,
                current: info.current,
            },
            message: limit_reached_message(&label, info),
        };
    }

    match QuotaAlert::from_limit(info) {
        QuotaAlert::Approaching(percent) => LimitDecision::AllowedWithWarning {
            warning: format!(
                "You have used {}% of your plan's {} limit ({}/{}).",
                percent,
                label,
                info.current,
                info.limit.unwrap_or_default()
            ),
        },
        _ => LimitDecision::Allowed,
    }
}

fn limit_reached_message(label: &str, info: &LimitInfo) -> String {
    match info.limit {
        Some(limit) => format!(
            "You have reached your plan's {} limit ({}/{}). Upgrade your subscription to add more.",
            label, info.current, limit
        ),
        None => format!(
            "You have reached your plan's {} limit. Upgrade your subscription to add more.",
            label
        ),
    }
}

fn resource_label(resource: &str) -> String {
    resource.trim().replace(['_', '-'], " ").to_lowercase()
}

/// Quota alert levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaAlert {
    None,
    Approaching(u8), // Percentage used
    Exceeded,
}

impl QuotaAlert {
    pub fn from_usage(used: u64, limit: u64) -> Self {
        if used >= limit {
            Self::Exceeded
        } else {
            let percentage = (used as f64 / limit as f64 * 100.0) as u8;
            if percentage >= 80 {
                Self::Approaching(percentage)
            } else {
                Self::None
            }
        }
    }

    pub fn from_limit(info: &LimitInfo) -> Self {
        match info.limit {
            Some(limit) => Self::from_usage(info.current, limit),
            None => Self::None,
        }
    }
}
