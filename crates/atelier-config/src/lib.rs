//! Configuration parsing and validation for the atelier data core
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Local data directory (where the per-database SQLite files live)
//! - Optional remote store endpoint for replication
//! - Environment-variable overrides
//!
//! The core consumes these values; it does not own credential
//! lifecycle, which belongs to the embedding application's auth flow.

mod schema;

pub use schema::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<CoreConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> ConfigResult<CoreConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    CoreConfig::from_raw(raw)
}
