//! Program settings loaded from config.toml
//!
//! The file is optional. When it is absent every setting takes its default;
//! when it is present but malformed, loading fails with `Error::Config`.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct ProgramConfig {
    /// Settings for the "ready to redeem" listing
    #[serde(default)]
    pub listing: ListingConfig,
}

/// Settings for paginated listings
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Page size used when a caller does not ask for one
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
        }
    }
}

const fn default_page_size() -> u64 {
    10
}

/// Loads program configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file exists but cannot be read
/// - The TOML syntax is invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ProgramConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!("No config file at {path:?}, using defaults");
        return Ok(ProgramConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads program configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<ProgramConfig> {
    load_config("config.toml")
}
