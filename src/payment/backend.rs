use super::SubscriptionSnapshot;
use crate::config::ClientConfig;
use crate::error::{EntitlementError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Organization-scoped entitlement endpoints
#[async_trait]
pub trait EntitlementBackend: Send + Sync {
    /// `GET /{organization_id}/status`
    async fn fetch_status(&self, organization_id: &str) -> Result<SubscriptionSnapshot>;

    /// `PUT /{organization_id}/freetrial`
    async fn activate_free_trial(&self, organization_id: &str) -> Result<()>;
}

/// REST implementation over reqwest
pub struct HttpBackend {
    http_client: Client,
    backend_url: Url,
    access_token: Option<String>,
}

impl HttpBackend {
    pub fn new(backend_url: Url, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            backend_url,
            access_token: None,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut backend = Self::new(
            config.backend_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        backend.set_access_token(config.access_token.clone());
        Ok(backend)
    }

    /// Set auth token for authenticated requests
    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token.filter(|t| !t.trim().is_empty());
    }

    /// Build `{base}/{organization_id}/{action}`, keeping any path prefix on the base.
    fn endpoint(&self, organization_id: &str, action: &str) -> Result<Url> {
        let mut url = self.backend_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(organization_id)
            .push(action);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EntitlementError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl EntitlementBackend for HttpBackend {
    async fn fetch_status(&self, organization_id: &str) -> Result<SubscriptionSnapshot> {
        let url = self.endpoint(organization_id, "status")?;
        debug!("Fetching subscription status from {}", url);

        let response = self
            .authorize(self.http_client.get(url))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body = response.bytes().await?;
        let snapshot: SubscriptionSnapshot = serde_json::from_slice(&body)?;
        debug!(
            "Subscription status: active={}, {} limits",
            snapshot.has_subscription(),
            snapshot.limits.len()
        );
        Ok(snapshot)
    }

    async fn activate_free_trial(&self, organization_id: &str) -> Result<()> {
        let url = self.endpoint(organization_id, "freetrial")?;
        info!("Activating free trial for organization {}", organization_id);

        let response = self
            .authorize(self.http_client.put(url))
            .send()
            .await?;
        Self::check_status(response).await?;

        Ok(())
    }
}
