pub mod backend;
pub mod events;
pub mod limits;
pub mod subscription;

pub use backend::{EntitlementBackend, HttpBackend};
pub use events::{EntitlementEvent, EventHandler, ListenerId};
pub use limits::{BlockReason, LimitDecision, QuotaAlert};
pub use subscription::{StoreState, SubscriptionStore, TrialModalState};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Resource categories gated by the organization's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Staff,
    Assets,
    Clients,
    Vendors,
}

impl ResourceType {
    /// Key used in the backend `limits` map.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Assets => "assets",
            Self::Clients => "clients",
            Self::Vendors => "vendors",
        }
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(Self::Staff),
            "asset" | "assets" => Ok(Self::Assets),
            "client" | "clients" => Ok(Self::Clients),
            "vendor" | "vendors" => Ok(Self::Vendors),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}

/// Lifecycle state reported for the active plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    Unpaid,
    #[serde(other)]
    Unknown,
}

/// The organization's active plan as returned by the status endpoint.
///
/// The backend object is opaque: any JSON object decodes. The fields the
/// dashboard reads are picked out when they have a recognizable shape; every
/// other key, and any value that did not fit its typed field, stays in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct Subscription {
    pub id: Option<String>,
    pub plan_name: Option<String>,
    pub status: Option<SubscriptionState>,
    pub is_trial: bool,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Subscription {
    fn from(mut raw: Map<String, Value>) -> Self {
        let id = take_field(&mut raw, &["id", "_id"], |value| match value {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        });
        let plan_name = take_field(&mut raw, &["planName", "plan", "name"], |value| {
            value.as_str().map(str::to_string)
        })
        .or_else(|| nested_plan_name(&raw));
        let status = take_field(&mut raw, &["status"], |value| {
            SubscriptionState::deserialize(value).ok()
        });
        let is_trial = take_field(&mut raw, &["isTrial", "trial"], Value::as_bool).unwrap_or(false);
        let current_period_end =
            take_field(&mut raw, &["currentPeriodEnd", "endDate"], parse_timestamp);
        let trial_ends_at = take_field(&mut raw, &["trialEndsAt", "trialEnd"], parse_timestamp);

        Self {
            id,
            plan_name,
            status,
            is_trial,
            current_period_end,
            trial_ends_at,
            extra: raw,
        }
    }
}

/// First key whose value parses; that key is removed from `raw`. Values that
/// do not parse are left in place.
fn take_field<T>(
    raw: &mut Map<String, Value>,
    keys: &[&str],
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let (key, parsed) = keys
        .iter()
        .find_map(|key| raw.get(*key).and_then(&parse).map(|parsed| (*key, parsed)))?;
    raw.remove(key);
    Some(parsed)
}

// A populated plan reference, e.g. `"plan": { "name": "Business", "price": 49 }`.
fn nested_plan_name(raw: &Map<String, Value>) -> Option<String> {
    raw.get("plan")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// RFC 3339, a naive date-time taken as UTC, or a bare date at midnight UTC.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

impl Subscription {
    pub fn is_trialing(&self) -> bool {
        self.is_trial || self.status == Some(SubscriptionState::Trialing)
    }

    pub fn days_remaining(&self) -> Option<i64> {
        self.current_period_end
            .or(self.trial_ends_at)
            .map(|end| (end - Utc::now()).num_days())
    }

    pub fn needs_payment_update(&self) -> bool {
        matches!(
            self.status,
            Some(SubscriptionState::PastDue)
                | Some(SubscriptionState::Incomplete)
                | Some(SubscriptionState::Unpaid)
        )
    }
}

/// Per-resource entitlement record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitInfo {
    /// Maximum allowed count; `None` is unbounded.
    #[serde(default, deserialize_with = "deserialize_limit")]
    pub limit: Option<u64>,
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub allowed: bool,
}

impl LimitInfo {
    pub fn bounded(limit: u64, current: u64, allowed: bool) -> Self {
        Self {
            limit: Some(limit),
            current,
            allowed,
        }
    }

    pub fn unlimited(current: u64) -> Self {
        Self {
            limit: None,
            current,
            allowed: true,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit.is_none()
    }

    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.current))
    }

    pub fn usage_percent(&self) -> Option<f32> {
        match self.limit {
            Some(0) => Some(100.0),
            Some(limit) => Some(self.current as f32 / limit as f32 * 100.0),
            None => None,
        }
    }
}

// The backend marks unbounded plans with `null`, a missing key or `-1`.
fn deserialize_limit<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<i64> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| u64::try_from(value).ok()))
}

/// Point-in-time copy of the organization's plan and per-resource limits
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    #[serde(default)]
    pub subscription: Option<Subscription>,
    #[serde(default)]
    pub limits: HashMap<String, LimitInfo>,
}

impl SubscriptionSnapshot {
    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn limit_for(&self, resource: &str) -> Option<&LimitInfo> {
        self.limits.get(resource)
    }

    /// Resource names sorted for stable display.
    pub fn resource_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.limits.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_type_parse() {
        assert_eq!("staff".parse::<ResourceType>().unwrap(), ResourceType::Staff);
        assert_eq!("Vendor".parse::<ResourceType>().unwrap(), ResourceType::Vendors);
        assert!("rooms".parse::<ResourceType>().is_err());
        assert_eq!(ResourceType::Assets.to_string(), "assets");
    }

    #[test]
    fn test_snapshot_decode() {
        let snapshot: SubscriptionSnapshot = serde_json::from_value(json!({
            "subscription": {
                "_id": "sub_9",
                "plan": "Business",
                "status": "trialing",
                "seats": 12
            },
            "limits": {
                "staff": { "limit": 5, "current": 3, "allowed": true },
                "assets": { "limit": -1, "current": 420, "allowed": true },
                "clients": { "limit": null, "current": 0, "allowed": true }
            }
        }))
        .unwrap();

        assert!(snapshot.has_subscription());
        let subscription = snapshot.subscription.as_ref().unwrap();
        assert_eq!(subscription.id.as_deref(), Some("sub_9"));
        assert_eq!(subscription.plan_name.as_deref(), Some("Business"));
        assert!(subscription.is_trialing());
        assert_eq!(subscription.extra.get("seats"), Some(&json!(12)));

        assert_eq!(snapshot.limit_for("staff"), Some(&LimitInfo::bounded(5, 3, true)));
        assert!(snapshot.limit_for("assets").unwrap().is_unlimited());
        assert!(snapshot.limit_for("clients").unwrap().is_unlimited());
        assert_eq!(snapshot.resource_names(), vec!["assets", "clients", "staff"]);
    }

    #[test]
    fn test_populated_plan_and_date_only_end_decode() {
        let snapshot: SubscriptionSnapshot = serde_json::from_value(json!({
            "subscription": {
                "_id": "s1",
                "plan": { "name": "Business", "price": 49 },
                "endDate": "2026-11-01",
                "trialEndsAt": 1_767_225_600
            },
            "limits": {}
        }))
        .unwrap();

        let subscription = snapshot.subscription.as_ref().unwrap();
        assert!(snapshot.has_subscription());
        assert_eq!(subscription.id.as_deref(), Some("s1"));
        assert_eq!(subscription.plan_name.as_deref(), Some("Business"));
        assert_eq!(
            subscription.current_period_end,
            Some(Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(subscription.trial_ends_at, None);
        assert_eq!(
            subscription.extra.get("plan"),
            Some(&json!({ "name": "Business", "price": 49 }))
        );
        assert_eq!(subscription.extra.get("trialEndsAt"), Some(&json!(1_767_225_600)));
        assert!(subscription.extra.get("endDate").is_none());
    }

    #[test]
    fn test_mistyped_fields_do_not_fail_decode() {
        let subscription: Subscription = serde_json::from_value(json!({
            "id": 77,
            "status": { "code": "active" },
            "isTrial": "yes",
            "currentPeriodEnd": "2026-11-01T12:30:00+02:00"
        }))
        .unwrap();

        assert_eq!(subscription.id.as_deref(), Some("77"));
        assert_eq!(subscription.status, None);
        assert!(!subscription.is_trial);
        assert_eq!(
            subscription.current_period_end,
            Some(Utc.with_ymd_and_hms(2026, 11, 1, 10, 30, 0).unwrap())
        );
        assert_eq!(subscription.extra.get("status"), Some(&json!({ "code": "active" })));
        assert_eq!(subscription.extra.get("isTrial"), Some(&json!("yes")));
    }

    #[test]
    fn test_snapshot_without_subscription() {
        let snapshot: SubscriptionSnapshot = serde_json::from_value(json!({
            "subscription": null,
            "limits": { "staff": { "limit": 2, "current": 2, "allowed": false } }
        }))
        .unwrap();

        assert!(!snapshot.has_subscription());
        assert_eq!(snapshot.limit_for("staff").unwrap().remaining(), Some(0));
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let subscription: Subscription =
            serde_json::from_value(json!({ "status": "paused_by_admin" })).unwrap();
        assert_eq!(subscription.status, Some(SubscriptionState::Unknown));
        assert!(!subscription.needs_payment_update());
    }

    #[test]
    fn test_limit_usage() {
        let info = LimitInfo::bounded(10, 8, true);
        assert_eq!(info.remaining(), Some(2));
        assert_eq!(info.usage_percent(), Some(80.0));
        assert_eq!(LimitInfo::unlimited(3).usage_percent(), None);
        assert_eq!(LimitInfo::bounded(0, 0, false).usage_percent(), Some(100.0));
    }
}
