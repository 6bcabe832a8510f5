//! Configuration management for storykeep
//!
//! The config file doubles as the page's local storage: it is where the
//! session credential lives. The worker side never reads it directly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Remote story API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://story-api.dicoding.dev/v1";

/// Origin the application shell is served from
pub const DEFAULT_ORIGIN: &str = "https://storykeep.github.io";

/// Path prefix of the application on its origin
pub const DEFAULT_BASE_PATH: &str = "/storykeep";

/// Current cache generation
pub const DEFAULT_CACHE_VERSION: u32 = 2;

/// How long the worker waits for a page to hand over the credential
pub const DEFAULT_TOKEN_TIMEOUT_SECS: u64 = 10;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote story API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Origin the shell is served from
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path prefix of the application on its origin
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Cache generation; bumping it retires the previous caches on activate
    #[serde(default = "default_cache_version")]
    pub cache_version: u32,

    /// Session credential (bearer token)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Bounded wait for a credential reply, in seconds
    #[serde(default = "default_token_timeout_secs")]
    pub token_timeout_secs: u64,

    /// Extra URLs to precache at install time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub precache: Vec<String>,

    /// Push notification settings
    #[serde(default)]
    pub push: PushConfig,
}

/// Push notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    /// VAPID public key (base64url) of the story API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vapid_public_key: Option<String>,

    /// Push service endpoint prefix; push is unsupported without it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    /// Remembered notification permission decision
    #[serde(default)]
    pub permission: PermissionSetting,
}

/// Notification permission as remembered by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionSetting {
    /// Not decided yet; the user is prompted on subscribe
    #[default]
    Default,
    Granted,
    Denied,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_cache_version() -> u32 {
    DEFAULT_CACHE_VERSION
}

fn default_token_timeout_secs() -> u64 {
    DEFAULT_TOKEN_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            origin: default_origin(),
            base_path: default_base_path(),
            cache_version: default_cache_version(),
            token: None,
            token_timeout_secs: default_token_timeout_secs(),
            precache: Vec::new(),
            push: PushConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".storykeep").join("config.yaml"))
    }

    /// Resolve an optional override to a concrete config path
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration from a specific path, falling back to defaults
    /// when no file exists
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // The file holds the session token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Reject values the worker cannot operate with
    pub fn validate(&self) -> Result<()> {
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "base_path must start with '/': {}",
                self.base_path
            ))
            .into());
        }
        if self.cache_version == 0 {
            return Err(ConfigError::Invalid("cache_version must be at least 1".to_string()).into());
        }
        Ok(())
    }

    /// The stored credential, ignoring blank values
    pub fn credential(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Base path without a trailing slash
    pub fn base_path(&self) -> &str {
        self.base_path.trim_end_matches('/')
    }

    /// Base API URL without a trailing slash
    pub fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// Root URL of the application (what a notification click opens)
    pub fn app_root_url(&self) -> String {
        format!("{}{}/", self.origin.trim_end_matches('/'), self.base_path())
    }
}

/// Resolve the data directory (story store, caches, push state)
pub fn data_dir(override_dir: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::data_dir().ok_or(ConfigError::Invalid(
        "Could not determine data directory".to_string(),
    ))?;
    Ok(base.join("storykeep"))
}
