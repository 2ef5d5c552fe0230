use kb_client::{ClientError, FetchError, LocatorError};
use thiserror::Error;

/// Hard failures while resolving through the catalog.
///
/// Absent entities, exhausted migrations and unstable hierarchies are not
/// errors; they resolve to "nothing".
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to fetch from the knowledge catalog")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Locator(#[from] LocatorError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid retry interval: {0}")]
    InvalidRetryInterval(String),
    #[error("'max_rounds' must be at least 1")]
    ZeroRounds,
    #[error("failed to load configuration")]
    Load(#[from] ::config::ConfigError),
    #[error("invalid client configuration")]
    Client(#[from] ClientError),
}

impl From<kb_client::ConfigError> for ConfigError {
    fn from(err: kb_client::ConfigError) -> Self {
        ConfigError::Client(ClientError::Config(err))
    }
}
