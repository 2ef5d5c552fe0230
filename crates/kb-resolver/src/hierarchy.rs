//! Reconstructing an entity together with its ancestors.
//!
//! Parents are resolved through their own migrations. When the parent an
//! entity points at has itself migrated to a different entity, the child's
//! view of the hierarchy is stale, so the whole round is repeated from the
//! child's current href until the hierarchy is consistent or the round
//! limit is reached.

use kb_client::{CatalogEntity, Component, EntityLocator, MigrationRecord, Variant, Version};
use tracing::{debug, instrument, warn};

use crate::error::ResolveError;
use crate::redirect::RedirectResolver;
use crate::source::EntitySource;

/// A resolved entity, the migrations followed to reach it and its resolved
/// parent (`()` for entities at the top of the hierarchy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode<T, P = ()> {
    pub entity: T,
    pub migration_history: Vec<MigrationRecord>,
    pub parent: P,
}

pub type ComponentNode = HierarchyNode<Component>;
pub type VersionHierarchy = HierarchyNode<Version, ComponentNode>;
pub type VariantHierarchy = HierarchyNode<Variant, VersionHierarchy>;

#[derive(Debug, Clone)]
pub struct HierarchyResolver {
    redirect: RedirectResolver,
    max_rounds: u32,
}

impl HierarchyResolver {
    pub fn new(redirect: RedirectResolver, max_rounds: u32) -> Self {
        Self {
            redirect,
            max_rounds,
        }
    }

    /// Resolve a version and its component.
    ///
    /// `Ok(None)` if either is absent or unresolved, or if the hierarchy
    /// does not settle within `max_rounds`.
    #[instrument(skip_all, fields(locator = %locator))]
    pub fn resolve_version_hierarchy(
        &self,
        source: &impl EntitySource,
        locator: &EntityLocator,
    ) -> Result<Option<VersionHierarchy>, ResolveError> {
        let mut current = locator.clone();
        let mut carried_history = Vec::new();

        for round in 0..self.max_rounds {
            let resolved = self
                .redirect
                .resolve(&current, |l| source.fetch_version(l))
                .into_found()?;
            let Some((version, history)) = resolved else {
                return Ok(None);
            };
            let version_history = concat(&carried_history, history);

            let Some(parent) = version.component_locator() else {
                debug!(href = %version.meta.href, "version has no component");
                return Ok(None);
            };
            let resolved = self
                .redirect
                .resolve(&parent, |l| source.fetch_component(l))
                .into_found()?;
            let Some((component, component_history)) = resolved else {
                return Ok(None);
            };

            if is_stale(&parent, &component, &component_history) {
                debug!(round, %parent, "component has migrated, restarting from version");
                current = version.locator()?;
                carried_history = version_history;
                continue;
            }

            return Ok(Some(HierarchyNode {
                entity: version,
                migration_history: version_history,
                parent: HierarchyNode {
                    entity: component,
                    migration_history: component_history,
                    parent: (),
                },
            }));
        }

        warn!(rounds = self.max_rounds, "version hierarchy did not stabilize");
        Ok(None)
    }

    /// Resolve a variant, its version and that version's component.
    #[instrument(skip_all, fields(locator = %locator))]
    pub fn resolve_variant_hierarchy(
        &self,
        source: &impl EntitySource,
        locator: &EntityLocator,
    ) -> Result<Option<VariantHierarchy>, ResolveError> {
        let mut current = locator.clone();
        let mut carried_history = Vec::new();

        for round in 0..self.max_rounds {
            let resolved = self
                .redirect
                .resolve(&current, |l| source.fetch_variant(l))
                .into_found()?;
            let Some((variant, history)) = resolved else {
                return Ok(None);
            };
            let variant_history = concat(&carried_history, history);

            let Some(parent) = variant.version_locator() else {
                debug!(href = %variant.meta.href, "variant has no version");
                return Ok(None);
            };
            let Some(version) = self.resolve_version_hierarchy(source, &parent)? else {
                return Ok(None);
            };

            if is_stale(&parent, &version.entity, &version.migration_history) {
                debug!(round, %parent, "version has migrated, restarting from variant");
                current = variant.locator()?;
                carried_history = variant_history;
                continue;
            }

            return Ok(Some(HierarchyNode {
                entity: variant,
                migration_history: variant_history,
                parent: version,
            }));
        }

        warn!(rounds = self.max_rounds, "variant hierarchy did not stabilize");
        Ok(None)
    }
}

/// The parent pointer is stale if following it involved migrations that
/// ended at a different entity.
fn is_stale(
    pointer: &EntityLocator,
    parent: &impl CatalogEntity,
    history: &[MigrationRecord],
) -> bool {
    if history.is_empty() {
        return false;
    }
    match parent.locator() {
        Ok(resolved) => resolved.id() != pointer.id(),
        Err(_) => true,
    }
}

fn concat(carried: &[MigrationRecord], history: Vec<MigrationRecord>) -> Vec<MigrationRecord> {
    if carried.is_empty() {
        return history;
    }
    carried.iter().cloned().chain(history).collect()
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use kb_client::{EntityKind, MigrationKind};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::{MockCatalog, MockResponse, version};
    use crate::retry::RetryInterval;

    fn resolver(max_rounds: u32) -> HierarchyResolver {
        HierarchyResolver::new(RedirectResolver::new(3, RetryInterval::none()), max_rounds)
    }

    #[test]
    fn resolves_version_and_component() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &c1);

        let hierarchy = resolver(3)
            .resolve_version_hierarchy(&catalog, &v1)
            .unwrap()
            .unwrap();

        assert_eq!(hierarchy.entity.meta.href, *v1.href());
        assert_eq!(hierarchy.parent.entity.meta.href, *c1.href());
        assert!(hierarchy.migration_history.is_empty());
        assert!(hierarchy.parent.migration_history.is_empty());
    }

    #[test]
    fn migrated_version_keeps_its_history() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &c1);
        let v2 = catalog.add_version("v2", &c1);
        catalog.merge(&v1, &v2);

        let hierarchy = resolver(3)
            .resolve_version_hierarchy(&catalog, &v1)
            .unwrap()
            .unwrap();

        assert_eq!(hierarchy.entity.meta.href, *v2.href());
        assert_eq!(hierarchy.migration_history.len(), 1);
        assert_eq!(hierarchy.migration_history[0].kind, MigrationKind::Merge);
    }

    #[test]
    fn absent_parent_yields_nothing() {
        let catalog = MockCatalog::new();
        let c1 = catalog.locate(EntityKind::Component, "c1");
        let v1 = catalog.add_version("v1", &c1);

        let hierarchy = resolver(3).resolve_version_hierarchy(&catalog, &v1).unwrap();

        assert_eq!(hierarchy, None);
    }

    #[test]
    fn absent_version_yields_nothing() {
        let catalog = MockCatalog::new();
        let v1 = catalog.locate(EntityKind::Version, "v1");

        let hierarchy = resolver(3).resolve_version_hierarchy(&catalog, &v1).unwrap();

        assert_eq!(hierarchy, None);
        assert_eq!(catalog.total_hits(), 1);
    }

    #[test]
    fn failed_parent_fetch_is_an_error() {
        let catalog = MockCatalog::new();
        let c1 = catalog.locate(EntityKind::Component, "c1");
        catalog.set_failed(&c1, StatusCode::BAD_GATEWAY);
        let v1 = catalog.add_version("v1", &c1);

        let result = resolver(3).resolve_version_hierarchy(&catalog, &v1);

        assert!(matches!(result, Err(ResolveError::Fetch(_))));
    }

    #[test]
    fn restarts_when_parent_migrated_and_settles() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let c2 = catalog.add_component("c2");
        catalog.merge(&c1, &c2);
        let v1 = catalog.locate(EntityKind::Version, "v1");
        // the catalog updates the version's parent link after the merge
        catalog.set_responses(&v1, [
            MockResponse::Version(version(&v1, &c1, None)),
            MockResponse::Version(version(&v1, &c2, None)),
        ]);

        let hierarchy = resolver(3)
            .resolve_version_hierarchy(&catalog, &v1)
            .unwrap()
            .unwrap();

        assert_eq!(hierarchy.entity.meta.href, *v1.href());
        assert_eq!(hierarchy.parent.entity.meta.href, *c2.href());
        assert!(hierarchy.parent.migration_history.is_empty());
        assert_eq!(catalog.hits(&v1), 2);
    }

    #[test]
    fn unstable_hierarchy_gives_up_after_max_rounds() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let c2 = catalog.add_component("c2");
        catalog.merge(&c1, &c2);
        let v1 = catalog.add_version("v1", &c1);

        let hierarchy = resolver(2).resolve_version_hierarchy(&catalog, &v1).unwrap();

        assert_eq!(hierarchy, None);
        assert_eq!(catalog.hits(&v1), 2);
    }

    #[test]
    fn resolves_variant_hierarchy() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &c1);
        let x1 = catalog.add_variant("x1", &v1);

        let hierarchy = resolver(3)
            .resolve_variant_hierarchy(&catalog, &x1)
            .unwrap()
            .unwrap();

        assert_eq!(hierarchy.entity.meta.href, *x1.href());
        assert_eq!(hierarchy.parent.entity.meta.href, *v1.href());
        assert_eq!(hierarchy.parent.parent.entity.meta.href, *c1.href());
    }

    #[test]
    fn variant_of_absent_version_yields_nothing() {
        let catalog = MockCatalog::new();
        let v1 = catalog.locate(EntityKind::Version, "v1");
        let x1 = catalog.add_variant("x1", &v1);

        let hierarchy = resolver(3).resolve_variant_hierarchy(&catalog, &x1).unwrap();

        assert_eq!(hierarchy, None);
        assert_eq!(catalog.hits(&x1), 1);
    }

    #[test]
    fn variant_restarts_when_version_migrated() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &c1);
        let v2 = catalog.add_version("v2", &c1);
        catalog.merge(&v1, &v2);
        let x1 = catalog.locate(EntityKind::Variant, "x1");
        catalog.set_responses(&x1, [
            MockResponse::Variant(crate::mock::variant(&x1, &v1, None)),
            MockResponse::Variant(crate::mock::variant(&x1, &v2, None)),
        ]);

        let hierarchy = resolver(3)
            .resolve_variant_hierarchy(&catalog, &x1)
            .unwrap()
            .unwrap();

        assert_eq!(hierarchy.parent.entity.meta.href, *v2.href());
        assert!(hierarchy.parent.migration_history.is_empty());
        assert_eq!(catalog.hits(&x1), 2);
    }

    #[test]
    fn variant_of_unstable_version_yields_nothing() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &c1);
        let v2 = catalog.add_version("v2", &c1);
        catalog.merge(&v1, &v2);
        let x1 = catalog.add_variant("x1", &v1);

        let hierarchy = resolver(3).resolve_variant_hierarchy(&catalog, &x1).unwrap();

        assert_eq!(hierarchy, None);
        assert_eq!(catalog.hits(&x1), 3);
    }

    #[test]
    fn zero_rounds_resolve_nothing() {
        let catalog = MockCatalog::new();
        let c1 = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &c1);

        let hierarchy = resolver(0).resolve_version_hierarchy(&catalog, &v1).unwrap();

        assert_eq!(hierarchy, None);
        assert_eq!(catalog.total_hits(), 0);
    }
}
