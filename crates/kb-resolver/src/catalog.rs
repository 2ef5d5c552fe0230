use kb_client::{
    CatalogClient,
    Component,
    EntityKind,
    License,
    LicenseExpression,
    LicenseNode,
    Variant,
    Version,
};
use tracing::{debug, instrument};

use crate::config::{KnowledgeCatalogConfig, ResolutionConfig};
use crate::error::{ConfigError, ResolveError};
use crate::hierarchy::{HierarchyResolver, VariantHierarchy, VersionHierarchy};
use crate::license::LicenseDefinitionResolver;
use crate::redirect::{RedirectResolver, ResolutionResult};
use crate::source::EntitySource;

/// Migration-aware access to the knowledge catalog.
///
/// Every lookup follows migrations to the entity's current incarnation.
/// Lookups by id take the id as the catalog knows it, which may be the id
/// of an entity that has since been merged or split.
#[derive(Debug)]
pub struct KnowledgeCatalog<S = CatalogClient> {
    source: S,
    redirect: RedirectResolver,
    hierarchy: HierarchyResolver,
    licenses: LicenseDefinitionResolver,
}

impl KnowledgeCatalog<CatalogClient> {
    /// Connect to the catalog described by `config`.
    ///
    /// No request is made until the first lookup.
    pub fn from_config(config: &KnowledgeCatalogConfig) -> Result<Self, ConfigError> {
        let client = CatalogClient::new(&config.client)?;
        Self::new(client, &config.resolution)
    }
}

impl<S: EntitySource> KnowledgeCatalog<S> {
    pub fn new(source: S, resolution: &ResolutionConfig) -> Result<Self, ConfigError> {
        resolution.validate()?;
        let redirect = RedirectResolver::new(resolution.max_attempts, resolution.retry_interval()?);
        Ok(Self {
            hierarchy: HierarchyResolver::new(redirect.clone(), resolution.max_rounds),
            licenses: LicenseDefinitionResolver::new(redirect.clone(), resolution.max_depth),
            redirect,
            source,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn component(&self, id: &str) -> Result<ResolutionResult<Component>, ResolveError> {
        let locator = self.source.locator(EntityKind::Component, id)?;
        Ok(self
            .redirect
            .resolve(&locator, |l| self.source.fetch_component(l)))
    }

    pub fn version(&self, id: &str) -> Result<ResolutionResult<Version>, ResolveError> {
        let locator = self.source.locator(EntityKind::Version, id)?;
        Ok(self
            .redirect
            .resolve(&locator, |l| self.source.fetch_version(l)))
    }

    pub fn variant(&self, id: &str) -> Result<ResolutionResult<Variant>, ResolveError> {
        let locator = self.source.locator(EntityKind::Variant, id)?;
        Ok(self
            .redirect
            .resolve(&locator, |l| self.source.fetch_variant(l)))
    }

    pub fn license(&self, id: &str) -> Result<ResolutionResult<License>, ResolveError> {
        let locator = self.source.locator(EntityKind::License, id)?;
        Ok(self
            .redirect
            .resolve(&locator, |l| self.source.fetch_license(l)))
    }

    pub fn version_hierarchy(&self, id: &str) -> Result<Option<VersionHierarchy>, ResolveError> {
        let locator = self.source.locator(EntityKind::Version, id)?;
        self.hierarchy
            .resolve_version_hierarchy(&self.source, &locator)
    }

    pub fn variant_hierarchy(&self, id: &str) -> Result<Option<VariantHierarchy>, ResolveError> {
        let locator = self.source.locator(EntityKind::Variant, id)?;
        self.hierarchy
            .resolve_variant_hierarchy(&self.source, &locator)
    }

    pub fn license_definition(
        &self,
        expression: &LicenseExpression,
    ) -> Result<Option<LicenseNode>, ResolveError> {
        self.licenses.resolve(&self.source, expression)
    }

    /// The materialized license of version `id`.
    ///
    /// `None` if the version cannot be resolved, declares no license, or
    /// its license cannot be fully materialized.
    #[instrument(skip(self))]
    pub fn version_license(&self, id: &str) -> Result<Option<LicenseNode>, ResolveError> {
        let Some((version, _)) = self.version(id)?.into_found()? else {
            return Ok(None);
        };
        let Some(expression) = version.license else {
            debug!("version declares no license");
            return Ok(None);
        };
        self.license_definition(&expression)
    }

    /// The materialized license of variant `id`.
    #[instrument(skip(self))]
    pub fn variant_license(&self, id: &str) -> Result<Option<LicenseNode>, ResolveError> {
        let Some((variant, _)) = self.variant(id)?.into_found()? else {
            return Ok(None);
        };
        let Some(expression) = variant.license else {
            debug!("variant declares no license");
            return Ok(None);
        };
        self.license_definition(&expression)
    }
}
