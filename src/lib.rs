pub mod config;
pub mod error;
pub mod gate;
pub mod notifications;
pub mod payment;
pub mod session;

pub use config::ClientConfig;
pub use error::{EntitlementError, Result};
pub use gate::{AccessGate, GateState, GateView, RedirectTarget, RouteDecision};
pub use notifications::{Notice, NoticeKind, NoticeLevel, Notifier};
pub use payment::{LimitInfo, ResourceType, Subscription, SubscriptionSnapshot, SubscriptionStore};
pub use session::{MemorySessionStorage, SessionStorage};
