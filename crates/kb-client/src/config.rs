//! Configuration types for catalog client construction.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Configuration for catalog client construction.
///
/// The `Debug` implementation redacts the license key.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the catalog, without the `/api` suffix.
    pub base_url: Url,
    /// License key exchanged for a bearer token on first use.
    pub license_key: String,
    /// `User-Agent` sent with every request.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Additional headers to include in requests.
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("license_key", &"[REDACTED]")
            .field("user_agent", &self.user_agent)
            .field("extra_headers", &self.extra_headers)
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// A configuration with default timeouts and no extra headers.
    pub fn new(base_url: Url, license_key: impl Into<String>) -> Self {
        Self {
            base_url,
            license_key: license_key.into(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Reject configurations that cannot possibly authenticate or connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.license_key.trim().is_empty() {
            return Err(ConfigError::MissingLicenseKey);
        }
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a catalog license key is required")]
    MissingLicenseKey,
    #[error("'{0}' cannot be used as a catalog base url")]
    InvalidBaseUrl(Url),
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}
