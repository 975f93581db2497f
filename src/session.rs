//! Session-scoped key/value storage.
//!
//! Mirrors browser `sessionStorage`: values survive a reload of the same
//! session and are gone once the session ends. The entitlement core only reads
//! the organization id and reads/writes the free-trial marker.

use crate::error::{EntitlementError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Organization id written by the authentication layer.
pub const ORGANIZATION_ID_KEY: &str = "organizationId";

/// Set once the free-trial prompt has been shown, dismissed or acted on.
pub const FREE_TRIAL_MODAL_KEY: &str = "freeTrialModalShown";

/// Values recorded under [`FREE_TRIAL_MODAL_KEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialMarker {
    Shown,
    Dismissed,
    Activated,
}

impl TrialMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shown => "shown",
            Self::Dismissed => "dismissed",
            Self::Activated => "activated",
        }
    }
}

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// End the session, dropping every key.
    fn clear(&self) -> Result<()>;

    /// Organization of the logged-in user, if the auth layer has stored one.
    fn organization_id(&self) -> Option<String> {
        self.get(ORGANIZATION_ID_KEY)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id != "null" && id != "undefined")
    }

    fn trial_marker_present(&self) -> bool {
        self.get(FREE_TRIAL_MODAL_KEY).is_some()
    }
}

/// Process-lifetime session
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(organization_id: &str) -> Self {
        let storage = Self::new();
        if let Ok(mut values) = storage.values.write() {
            values.insert(ORGANIZATION_ID_KEY.to_string(), organization_id.to_string());
        }
        storage
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|e| EntitlementError::Session(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|e| EntitlementError::Session(e.to_string()))?
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.values
            .write()
            .map_err(|e| EntitlementError::Session(e.to_string()))?
            .clear();
        Ok(())
    }
}

/// Storage format for the session file
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    values: HashMap<String, String>,
}

/// Session persisted to a JSON file so that separate CLI invocations share it.
///
/// Writes go straight to disk; a missing or unreadable file is an empty session.
pub struct JsonFileSession {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl JsonFileSession {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<SessionFile>(&contents) {
                Ok(file) => file.values,
                Err(e) => {
                    warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!("Opened session {} with {} keys", path.display(), values.len());

        Self {
            path,
            values: RwLock::new(values),
        }
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EntitlementError::Session(e.to_string()))?;
        }
        let file = SessionFile {
            values: values.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, contents).map_err(|e| EntitlementError::Session(e.to_string()))
    }

    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut values = self
            .values
            .write()
            .map_err(|e| EntitlementError::Session(e.to_string()))?;
        change(&mut *values);
        self.persist(&*values)
    }
}

impl SessionStorage for JsonFileSession {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| {
            values.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(|values| values.clear())
    }
}
