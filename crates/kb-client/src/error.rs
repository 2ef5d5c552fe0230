//! Error handling for catalog API operations.

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::config::ConfigError;

/// An entity href or id could not be turned into an [`EntityLocator`](crate::EntityLocator).
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("invalid catalog url")]
    InvalidUrl(#[source] url::ParseError),
    #[error("'{0}' does not name a catalog entity")]
    MissingId(Url),
}

/// Failures of the HTTP transport itself, before any status is interpreted.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed")]
    Request(#[source] reqwest::Error),
    #[error("failed to read response body")]
    Body(#[source] reqwest::Error),
}

/// Why a single fetch produced [`FetchOutcome::Failed`](crate::FetchOutcome::Failed).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {href} failed")]
    Transport {
        href: Url,
        #[source]
        source: TransportError,
    },
    #[error("failed to parse response from {href}")]
    Deserialize {
        href: Url,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not obtain a catalog credential")]
    Unauthenticated,
    #[error("{href} returned unexpected status {status}")]
    UnexpectedStatus { href: Url, status: StatusCode },
    #[error("invalid migration response from {href}")]
    InvalidMigration {
        href: Url,
        #[source]
        source: LocatorError,
    },
}

/// Errors constructing a [`CatalogClient`](crate::CatalogClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build http client")]
    BuildClient(#[source] reqwest::Error),
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Locator(#[from] LocatorError),
}
