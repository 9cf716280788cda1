//! Client configuration, loadable from a TOML file.
//!
//! ```toml
//! base_url = "https://api.guildwars2.com"
//! access_token = "XXXXXXXX-XXXX-..."
//! locale = "de"
//! timeout_secs = 10
//!
//! [cache]
//! enabled = true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transport::parse_base_url;
use crate::types::Locale;

pub const DEFAULT_BASE_URL: &str = "https://api.guildwars2.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("gw2-core/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            locale: Locale::default(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_base_url(&self.base_url)?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ClientConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
