//! Migration-aware resolution on top of [`kb_client`].
//!
//! Entities in the knowledge catalog are merged and split over time. This
//! crate follows those migrations to the current incarnation of an entity,
//! reconstructs consistent version and variant hierarchies, and
//! materializes license expressions.
//!
//! ## Usage
//!
//! ```ignore
//! use kb_resolver::{KnowledgeCatalog, KnowledgeCatalogConfig};
//!
//! let config = KnowledgeCatalogConfig::load(Some(Path::new("kb.toml")))?;
//! let catalog = KnowledgeCatalog::from_config(&config)?;
//! if let Some(hierarchy) = catalog.variant_hierarchy("7d3c...")? {
//!     println!("{}", hierarchy.parent.parent.entity.name);
//! }
//! ```

mod catalog;
mod config;
mod error;
mod hierarchy;
mod license;
mod redirect;
mod retry;
mod source;

#[cfg(any(test, feature = "tests"))]
pub mod mock;
#[cfg(any(test, feature = "tests"))]
pub mod test_helpers;

pub use catalog::KnowledgeCatalog;
pub use crate::config::{ENV_PREFIX, KnowledgeCatalogConfig, ResolutionConfig};
pub use error::{ConfigError, ResolveError};
pub use hierarchy::{
    ComponentNode,
    HierarchyNode,
    HierarchyResolver,
    VariantHierarchy,
    VersionHierarchy,
};
pub use license::LicenseDefinitionResolver;
pub use redirect::{RedirectResolver, Resolution, ResolutionResult};
pub use retry::{
    ExponentialBackoff,
    FibonacciBackoff,
    FixedInterval,
    RetryInterval,
    RetryIntervalConfig,
    RetryIntervalStrategy,
};
pub use source::EntitySource;
