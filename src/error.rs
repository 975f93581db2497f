//! Error types for the entitlement client.

use thiserror::Error;

/// Result type alias for entitlement operations.
pub type Result<T> = std::result::Result<T, EntitlementError>;

/// Errors raised while talking to the backend or the session store.
///
/// These never escape [`SubscriptionStore`](crate::payment::SubscriptionStore):
/// the store turns them into notifications and keeps its last good snapshot.
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Backend URL could not be built.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Session storage could not be read or written.
    #[error("Session storage error: {0}")]
    Session(String),

    /// No organization id is available in the session.
    #[error("No organization is associated with the current session")]
    MissingOrganization,
}

impl EntitlementError {
    /// Short text suitable for a toast body.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http(e) if e.is_timeout() => "The server took too long to respond".to_string(),
            Self::Http(_) => "Could not reach the server".to_string(),
            Self::Status { status, .. } if *status >= 500 => {
                "The server is temporarily unavailable".to_string()
            }
            Self::Status { status, body } if body.trim().is_empty() => {
                format!("Request was rejected ({})", status)
            }
            Self::Status { body, .. } => {
                error_body_message(body).unwrap_or_else(|| body.trim().to_string())
            }
            Self::Decode(_) => "The server sent an unexpected response".to_string(),
            other => other.to_string(),
        }
    }
}

// JSON error bodies carry the text under `message` or `error`.
fn error_body_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .filter_map(|key| value.get(*key)?.as_str())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}
