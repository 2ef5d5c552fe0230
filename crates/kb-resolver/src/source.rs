use kb_client::{
    CatalogClient,
    Component,
    EntityKind,
    EntityLocator,
    FetchOutcome,
    License,
    LocatorError,
    Variant,
    Version,
};

/// Where resolvers fetch catalog entities from.
///
/// Implemented by [`CatalogClient`] for the real API, and by
/// `MockCatalog` in tests.
pub trait EntitySource {
    /// The locator of entity `id` of the given kind.
    fn locator(&self, kind: EntityKind, id: &str) -> Result<EntityLocator, LocatorError>;

    fn fetch_component(&self, locator: &EntityLocator) -> FetchOutcome<Component>;
    fn fetch_version(&self, locator: &EntityLocator) -> FetchOutcome<Version>;
    fn fetch_variant(&self, locator: &EntityLocator) -> FetchOutcome<Variant>;
    fn fetch_license(&self, locator: &EntityLocator) -> FetchOutcome<License>;
}

impl EntitySource for CatalogClient {
    fn locator(&self, kind: EntityKind, id: &str) -> Result<EntityLocator, LocatorError> {
        CatalogClient::locator(self, kind, id)
    }

    fn fetch_component(&self, locator: &EntityLocator) -> FetchOutcome<Component> {
        CatalogClient::fetch_component(self, locator)
    }

    fn fetch_version(&self, locator: &EntityLocator) -> FetchOutcome<Version> {
        CatalogClient::fetch_version(self, locator)
    }

    fn fetch_variant(&self, locator: &EntityLocator) -> FetchOutcome<Variant> {
        CatalogClient::fetch_variant(self, locator)
    }

    fn fetch_license(&self, locator: &EntityLocator) -> FetchOutcome<License> {
        CatalogClient::fetch_license(self, locator)
    }
}

impl<S: EntitySource + ?Sized> EntitySource for &S {
    fn locator(&self, kind: EntityKind, id: &str) -> Result<EntityLocator, LocatorError> {
        (**self).locator(kind, id)
    }

    fn fetch_component(&self, locator: &EntityLocator) -> FetchOutcome<Component> {
        (**self).fetch_component(locator)
    }

    fn fetch_version(&self, locator: &EntityLocator) -> FetchOutcome<Version> {
        (**self).fetch_version(locator)
    }

    fn fetch_variant(&self, locator: &EntityLocator) -> FetchOutcome<Variant> {
        (**self).fetch_variant(locator)
    }

    fn fetch_license(&self, locator: &EntityLocator) -> FetchOutcome<License> {
        (**self).fetch_license(locator)
    }
}
