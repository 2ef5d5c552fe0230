//! Blocking HTTP client infrastructure for the knowledge catalog API.
//!
//! This crate provides:
//! - The catalog wire model (components, versions, variants, licenses)
//! - [`FetchOutcome`], the tri-state result of a single catalog lookup
//! - A narrow transport seam ([`HttpExecutor`]) with a `reqwest` implementation
//! - A process-wide [`AuthorizationCache`] shared by every request
//! - [`CatalogClient`], which maps endpoint responses to [`FetchOutcome`]s
//!
//! ## Usage
//!
//! ```ignore
//! use kb_client::{CatalogClient, ClientConfig, EntityKind};
//!
//! let client = CatalogClient::new(&config)?;
//! let locator = client.locator(EntityKind::Component, "c8f3...")?;
//! let outcome = client.fetch_component(&locator);
//! ```

mod auth;
mod client;
mod config;
mod error;
pub mod model;
mod outcome;
mod transport;

pub use auth::{AuthorizationCache, Authenticator, Credential, LicenseKeyAuthenticator};
pub use client::CatalogClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, FetchError, LocatorError, TransportError};
pub use model::{
    CatalogEntity,
    Component,
    EntityId,
    EntityKind,
    EntityLocator,
    License,
    LicenseExpression,
    LicenseNode,
    LicenseOperator,
    Link,
    Meta,
    Variant,
    Version,
};
pub use outcome::{FetchOutcome, Migration, MigrationKind, MigrationRecord};
pub use transport::{CatalogRequest, HttpExecutor, RawResponse, ReqwestExecutor};
