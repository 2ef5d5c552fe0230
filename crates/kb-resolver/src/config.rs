//! Layered configuration for [`KnowledgeCatalog`](crate::KnowledgeCatalog).
//!
//! Values are read, in increasing order of precedence, from
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. environment variables prefixed with `KB__`, using `__` to separate
//!    nested keys, e.g. `KB__CLIENT__LICENSE_KEY` or
//!    `KB__RESOLUTION__RETRY__STRATEGY`

use std::collections::HashMap;
use std::path::Path;

use ::config::{Config as HierarchicalConfig, Environment, File, FileFormat};
use kb_client::ClientConfig;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::retry::{RetryInterval, RetryIntervalConfig};

pub const ENV_PREFIX: &str = "KB";
const ENV_SEPARATOR: &str = "__";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_ROUNDS: u32 = 3;
const DEFAULT_MAX_DEPTH: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeCatalogConfig {
    pub client: ClientConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Bounds and pacing of migration, hierarchy and license resolution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolutionConfig {
    /// Migration hops followed per entity.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Attempts at reconstructing a consistent hierarchy.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Deepest nesting of license definitions that is materialized.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Wait between migration hops.
    #[serde(default)]
    pub retry: RetryIntervalConfig,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_depth: DEFAULT_MAX_DEPTH,
            retry: RetryIntervalConfig::default(),
        }
    }
}

impl ResolutionConfig {
    pub fn retry_interval(&self) -> Result<RetryInterval, ConfigError> {
        RetryInterval::try_from(&self.retry)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        self.retry_interval()?;
        Ok(())
    }
}

impl KnowledgeCatalogConfig {
    pub fn new(client: ClientConfig) -> Self {
        Self {
            client,
            resolution: ResolutionConfig::default(),
        }
    }

    /// Load configuration from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`Self::load`], reading environment variables from `env`
    /// instead of the process environment when it is `Some`.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = HierarchicalConfig::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "reading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .source(env)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;
        self.resolution.validate()
    }
}
