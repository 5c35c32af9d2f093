//! Configuration schema: raw TOML shape and the validated form

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::{ConfigError, ConfigResult};

/// Environment variable for overriding the data directory
pub const ATELIER_DATA_DIR_ENV: &str = "ATELIER_DATA_DIR";

/// Environment variable for overriding the remote store base URL
pub const ATELIER_REMOTE_URL_ENV: &str = "ATELIER_REMOTE_URL";

/// Application subdirectory name
const APP_DIR: &str = "atelier";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Directory holding the per-database SQLite files
    pub data_dir: Option<PathBuf>,

    /// Remote store endpoint for replication
    #[serde(default)]
    pub remote: Option<RawRemote>,
}

/// Raw remote-store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRemote {
    /// Base URL of the remote document store; each concrete database
    /// replicates against `{base_url}/{name}`
    pub base_url: String,

    /// HTTP request timeout in seconds
    pub request_timeout_seconds: Option<u64>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub remote: Option<RemoteConfig>,
}

/// Validated remote-store settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl CoreConfig {
    /// Validate a raw config and apply environment overrides.
    pub fn from_raw(raw: RawConfig) -> ConfigResult<Self> {
        let data_dir = match std::env::var(ATELIER_DATA_DIR_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => raw.data_dir.unwrap_or_else(default_data_dir),
        };

        let base_url_override = std::env::var(ATELIER_REMOTE_URL_ENV).ok();
        let remote = match (base_url_override, raw.remote) {
            (Some(url), Some(raw_remote)) => Some(RemoteConfig::new(url, raw_remote.request_timeout_seconds)?),
            (Some(url), None) => Some(RemoteConfig::new(url, None)?),
            (None, Some(raw_remote)) => {
                let timeout = raw_remote.request_timeout_seconds;
                Some(RemoteConfig::new(raw_remote.base_url, timeout)?)
            }
            (None, None) => None,
        };

        debug!(data_dir = %data_dir.display(), has_remote = remote.is_some(), "Config loaded");

        Ok(Self { data_dir, remote })
    }
}

impl RemoteConfig {
    fn new(base_url: String, timeout_seconds: Option<u64>) -> ConfigResult<Self> {
        if base_url.is_empty() {
            return Err(ConfigError::Invalid("remote.base_url is empty".into()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "remote.base_url must be http(s), got: {}",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            request_timeout: timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}

/// Default data directory.
///
/// Order of precedence:
/// 1. `$XDG_DATA_HOME/atelier` (if XDG_DATA_HOME is set)
/// 2. `~/.local/share/atelier` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_contains_atelier() {
        let path = default_data_dir();
        assert!(path.to_string_lossy().contains("atelier"));
    }

    #[test]
    fn default_timeout_applies() {
        let remote = RemoteConfig::new("http://localhost:5984".into(), None).unwrap();
        assert_eq!(remote.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
