use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

const DEFAULT_BACKEND_URL: &str = "https://api.assetdesk.app";
const DEFAULT_DASHBOARD_URL: &str = "https://app.assetdesk.app";

/// Client configuration, loaded from defaults, `config.toml`, `.env` and the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend_url: Url,
    pub dashboard_url: Url,
    pub organization_id: Option<String>,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub login_path: String,
    pub subscribe_path: String,
    /// Routes reachable without a session.
    pub public_routes: Vec<String>,
    /// Routes reachable without an active plan.
    pub exempt_routes: Vec<String>,
    pub desktop_notifications: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid"),
            dashboard_url: Url::parse(DEFAULT_DASHBOARD_URL)
                .expect("default dashboard URL is valid"),
            organization_id: None,
            access_token: None,
            request_timeout_secs: 15,
            login_path: "/login".to_string(),
            subscribe_path: "/subscription".to_string(),
            public_routes: vec![
                "/login".to_string(),
                "/signup".to_string(),
                "/forgot-password".to_string(),
            ],
            exempt_routes: vec![
                "/subscription".to_string(),
                "/subscription/history".to_string(),
                "/payment/callback".to_string(),
                "/profile".to_string(),
                "/dashboard".to_string(),
                "/terms".to_string(),
                "/privacy".to_string(),
            ],
            desktop_notifications: false,
        }
    }
}

impl ClientConfig {
    /// Platform config file, e.g. `~/.config/assetdesk/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("app", "assetdesk", "assetdesk")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Platform location of the CLI session file.
    pub fn session_path() -> PathBuf {
        directories::ProjectDirs::from("app", "assetdesk", "assetdesk")
            .map(|dirs| dirs.cache_dir().join("session.json"))
            .unwrap_or_else(|| PathBuf::from(".assetdesk-session.json"))
    }

    /// Load configuration for the CLI.
    ///
    /// An explicit path must exist; the platform default is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        // A missing .env is fine
        dotenv::dotenv().ok();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply `BACKEND_URL`, `ASSETDESK_ORG_ID` and `ASSETDESK_TOKEN` overrides.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            self.backend_url = Url::parse(url.trim())
                .with_context(|| format!("BACKEND_URL is not a valid URL: {}", url))?;
            debug!("Backend URL overridden from environment");
        }
        if let Some(org) = lookup("ASSETDESK_ORG_ID").filter(|v| !v.trim().is_empty()) {
            self.organization_id = Some(org.trim().to_string());
        }
        if let Some(token) = lookup("ASSETDESK_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.access_token = Some(token);
        }
        Ok(())
    }

    /// Full dashboard URL for a route, used when opening pages in a browser.
    pub fn page_url(&self, route: &str) -> Result<Url> {
        self.dashboard_url
            .join(route)
            .with_context(|| format!("Invalid dashboard route: {}", route))
    }
}
