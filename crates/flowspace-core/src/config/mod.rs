//! Client configuration.
//!
//! A JSON file under the user's config directory, overlaid by `FLOWSPACE_*`
//! environment variables. Every field is optional; missing values fall back
//! to local-only defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::RetryPolicy;
use crate::util::{is_http_url, normalize_text_option};

const CONFIG_DIR_NAME: &str = "flowspace";
const CONFIG_FILE_NAME: &str = "config.json";
const DATABASE_FILE_NAME: &str = "flowspace.db";

pub const ENV_API_URL: &str = "FLOWSPACE_API_URL";
pub const ENV_API_TOKEN: &str = "FLOWSPACE_API_TOKEN";
pub const ENV_DB_PATH: &str = "FLOWSPACE_DB_PATH";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "FLOWSPACE_REQUEST_TIMEOUT_SECS";
pub const ENV_USER_ID: &str = "FLOWSPACE_USER_ID";

/// Resolved client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// User reference stamped on locally created records
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Remote API connection settings
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// No timeout when unset
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Whether a remote API is configured at all
    pub const fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

/// Push retry settings, see [`RetryPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Failed pushes before a record is reported as stalled; `null` retries forever
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_attempts() -> Option<u32> {
    Some(8)
}

const fn default_base_delay_secs() -> u64 {
    2
}

const fn default_max_delay_secs() -> u64 {
    300
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs.max(self.base_delay_secs)),
        }
    }
}

/// Default config file location (`<config dir>/flowspace/config.json`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Default local store location (`<data dir>/flowspace/flowspace.db`)
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(DATABASE_FILE_NAME)
}

impl AppConfig {
    /// Load the default config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!("Failed to parse {}: {error}", path.display()))
        })?;
        config.normalize()?;
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Overlay values from `lookup` (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api.base_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_API_TOKEN)) {
            self.api.token = Some(token);
        }
        if let Some(path) = normalize_text_option(lookup(ENV_DB_PATH)) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(user_id) = normalize_text_option(lookup(ENV_USER_ID)) {
            self.user_id = Some(user_id);
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_REQUEST_TIMEOUT_SECS)) {
            let secs = raw.parse::<u64>().map_err(|_| {
                Error::Config(format!(
                    "{ENV_REQUEST_TIMEOUT_SECS} must be a whole number of seconds"
                ))
            })?;
            self.api.request_timeout_secs = Some(secs);
        }
        self.normalize()
    }

    /// Local store path, falling back to the platform data directory
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }

    fn normalize(&mut self) -> Result<()> {
        self.api.base_url = normalize_text_option(self.api.base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.api.token = normalize_text_option(self.api.token.take());
        self.user_id = normalize_text_option(self.user_id.take());

        if let Some(url) = &self.api.base_url {
            if !is_http_url(url) {
                return Err(Error::Config(
                    "API base URL must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }
}
