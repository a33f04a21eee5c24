//! # Hub Configuration
//!
//! Three-layer configuration resolution for the edge hub.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BEACON_CLOUD_URL, BEACON_API_KEY, BEACON_TENANT_ID, ...            │
//! │                                                                         │
//! │  2. Persisted JSON file                                                │
//! │     ~/.beacon-pos/hub-config.json (written by the pairing flow)        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     port 4001, db file under ~/.beacon-pos/, no cloud credentials      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credentials are read **live** through [`ConfigStore`] on every cloud
//! call, so a re-pair through the admin route takes effect without a
//! restart. File writes are atomic: the new content lands in a `.tmp`
//! sibling which is then renamed over the real file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// Default HTTP port the hub serves terminals on.
pub const DEFAULT_HTTP_PORT: u16 = 4001;

/// Directory name under the user's home for hub state.
const HUB_DIR: &str = ".beacon-pos";

/// File name of the persisted configuration.
const CONFIG_FILE: &str = "hub-config.json";

/// Complete hub configuration.
///
/// All cloud fields are optional: a freshly installed hub serves terminals
/// offline until the pairing flow fills them in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubConfig {
    /// Base URL of the cloud API (e.g. `https://api.example.com`).
    pub cloud_base_url: Option<String>,

    /// API key issued by the cloud at registration/pairing time.
    pub cloud_api_key: Option<String>,

    /// Tenant this location belongs to.
    pub tenant_id: Option<String>,

    /// Cloud-assigned location id.
    pub location_id: Option<String>,

    /// Local secret used to protect hub admin operations.
    pub hub_secret: Option<String>,

    /// Port the terminal-facing HTTP/WebSocket server binds.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Path of the SQLite database file.
    pub db_path: Option<String>,
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

impl HubConfig {
    /// True iff both the cloud base URL and API key are present.
    ///
    /// The sync engines gate every cycle on this.
    pub fn is_configured(&self) -> bool {
        self.cloud_base_url.as_deref().is_some_and(|s| !s.is_empty())
            && self.cloud_api_key.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Loads configuration: defaults, then the persisted file, then env.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = match config_path.or_else(Self::env_config_path) {
            Some(p) => Some(p),
            None => Self::default_config_path().ok(),
        };

        if let Some(ref path) = path {
            if path.exists() {
                info!(path = %path.display(), "Loading hub config from file");
                let contents = std::fs::read_to_string(path)?;
                config = serde_json::from_str(&contents)?;
            } else {
                debug!(path = %path.display(), "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads config or falls back to defaults, logging the failure.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load hub config: {}. Using defaults.", e);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Persists the configuration with an atomic overwrite.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = match config_path.or_else(Self::env_config_path) {
            Some(p) => p,
            None => Self::default_config_path()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;

        info!(path = %path.display(), "Hub config saved");
        Ok(())
    }

    /// Resolved database file path (configured or the default location).
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref p) = self.db_path {
            return Ok(PathBuf::from(p));
        }
        Ok(Self::hub_dir()?.join("beacon-hub.db"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BEACON_CLOUD_URL") {
            debug!("Overriding cloud URL from environment");
            self.cloud_base_url = Some(url);
        }
        if let Ok(key) = std::env::var("BEACON_API_KEY") {
            self.cloud_api_key = Some(key);
        }
        if let Ok(tenant) = std::env::var("BEACON_TENANT_ID") {
            self.tenant_id = Some(tenant);
        }
        if let Ok(location) = std::env::var("BEACON_LOCATION_ID") {
            self.location_id = Some(location);
        }
        if let Ok(secret) = std::env::var("BEACON_HUB_SECRET") {
            self.hub_secret = Some(secret);
        }
        if let Ok(port) = std::env::var("BEACON_HTTP_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.http_port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid BEACON_HTTP_PORT"),
            }
        }
        if let Ok(db) = std::env::var("BEACON_DB_PATH") {
            self.db_path = Some(db);
        }
    }

    fn env_config_path() -> Option<PathBuf> {
        std::env::var("BEACON_CONFIG_PATH").ok().map(PathBuf::from)
    }

    fn hub_dir() -> Result<PathBuf, ConfigError> {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(HUB_DIR))
            .ok_or(ConfigError::NoHomeDir)
    }

    fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::hub_dir()?.join(CONFIG_FILE))
    }
}

/// Shared, live-readable configuration holder.
///
/// The cloud client reads credentials through this on every request; the
/// pairing route replaces the snapshot and persists in one step.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<HubConfig>>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Wraps an already-loaded config. `path` overrides the default file
    /// location when set (tests point this at a temp directory).
    pub fn new(config: HubConfig, path: Option<PathBuf>) -> Self {
        ConfigStore {
            inner: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Returns a snapshot of the current configuration.
    pub fn get(&self) -> HubConfig {
        self.inner.read().expect("config lock poisoned").clone()
    }

    /// True iff the cloud credentials are currently present.
    pub fn is_configured(&self) -> bool {
        self.inner.read().expect("config lock poisoned").is_configured()
    }

    /// Applies a mutation and persists the result atomically.
    pub fn update<F>(&self, mutate: F) -> Result<HubConfig, ConfigError>
    where
        F: FnOnce(&mut HubConfig),
    {
        let updated = {
            let mut guard = self.inner.write().expect("config lock poisoned");
            mutate(&mut guard);
            guard.clone()
        };
        updated.save(self.path.clone())?;
        Ok(updated)
    }

    /// The file path this store persists to, if pinned.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
