//! An in-memory [`EntitySource`] for tests.
//!
//! Responses are registered per entity href. Each href holds a queue of
//! responses: every fetch pops the front of the queue until a single
//! response remains, which is then returned for every further fetch.
//! Unregistered hrefs are [`FetchOutcome::Absent`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use http::StatusCode;
use kb_client::model::{COMPONENT_REL, SUCCESSOR_REL, VERSION_REL};
use kb_client::{
    Component,
    EntityKind,
    EntityLocator,
    FetchError,
    FetchOutcome,
    License,
    LicenseExpression,
    LocatorError,
    Link,
    Meta,
    Migration,
    MigrationKind,
    MigrationRecord,
    Variant,
    Version,
};
use url::Url;

use crate::source::EntitySource;

pub const MOCK_BASE_URL: &str = "https://kb.example.com/";

#[derive(Debug, Clone)]
pub enum MockResponse {
    Component(Component),
    Version(Version),
    Variant(Variant),
    License(License),
    Migrated(Migration),
    Absent,
    Failed(StatusCode),
}

#[derive(Debug)]
pub struct MockCatalog {
    base_url: Url,
    responses: Mutex<HashMap<Url, VecDeque<MockResponse>>>,
    hits: Mutex<HashMap<Url, usize>>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            base_url: Url::parse(MOCK_BASE_URL).expect("valid mock base url"),
            responses: Mutex::new(HashMap::new()),
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// The locator of entity `id`, whether or not anything is registered for it.
    pub fn locate(&self, kind: EntityKind, id: &str) -> EntityLocator {
        EntityLocator::for_id(&self.base_url, kind, id).expect("valid mock locator")
    }

    /// Replace all responses registered for `locator`.
    pub fn set_response(&self, locator: &EntityLocator, response: MockResponse) {
        self.set_responses(locator, [response]);
    }

    /// Replace all responses registered for `locator` with a sequence.
    pub fn set_responses(
        &self,
        locator: &EntityLocator,
        responses: impl IntoIterator<Item = MockResponse>,
    ) {
        self.responses
            .lock()
            .expect("couldn't acquire mock lock")
            .insert(locator.href().clone(), responses.into_iter().collect());
    }

    pub fn add_component(&self, id: &str) -> EntityLocator {
        let locator = self.locate(EntityKind::Component, id);
        self.set_response(&locator, MockResponse::Component(component(&locator)));
        locator
    }

    pub fn add_version(&self, id: &str, component: &EntityLocator) -> EntityLocator {
        let locator = self.locate(EntityKind::Version, id);
        self.set_response(
            &locator,
            MockResponse::Version(version(&locator, component, None)),
        );
        locator
    }

    pub fn add_licensed_version(
        &self,
        id: &str,
        component: &EntityLocator,
        license: LicenseExpression,
    ) -> EntityLocator {
        let locator = self.locate(EntityKind::Version, id);
        self.set_response(
            &locator,
            MockResponse::Version(version(&locator, component, Some(license))),
        );
        locator
    }

    pub fn add_variant(&self, id: &str, version: &EntityLocator) -> EntityLocator {
        let locator = self.locate(EntityKind::Variant, id);
        self.set_response(
            &locator,
            MockResponse::Variant(variant(&locator, version, None)),
        );
        locator
    }

    pub fn add_licensed_variant(
        &self,
        id: &str,
        version: &EntityLocator,
        license: LicenseExpression,
    ) -> EntityLocator {
        let locator = self.locate(EntityKind::Variant, id);
        self.set_response(
            &locator,
            MockResponse::Variant(variant(&locator, version, Some(license))),
        );
        locator
    }

    pub fn add_license(&self, id: &str, spdx_id: &str) -> EntityLocator {
        let locator = self.locate(EntityKind::License, id);
        self.set_response(&locator, MockResponse::License(license(&locator, spdx_id)));
        locator
    }

    /// `from` was merged into `to`.
    pub fn merge(&self, from: &EntityLocator, to: &EntityLocator) {
        self.set_response(
            from,
            MockResponse::Migrated(migration(from, MigrationKind::Merge, &[to.clone()])),
        );
    }

    /// `from` was split into `to`.
    pub fn split(&self, from: &EntityLocator, to: &[EntityLocator]) {
        self.set_response(
            from,
            MockResponse::Migrated(migration(from, MigrationKind::Split, to)),
        );
    }

    pub fn set_absent(&self, locator: &EntityLocator) {
        self.set_response(locator, MockResponse::Absent);
    }

    pub fn set_failed(&self, locator: &EntityLocator, status: StatusCode) {
        self.set_response(locator, MockResponse::Failed(status));
    }

    /// How often `locator` was fetched.
    pub fn hits(&self, locator: &EntityLocator) -> usize {
        self.hits
            .lock()
            .expect("couldn't acquire mock lock")
            .get(locator.href())
            .copied()
            .unwrap_or_default()
    }

    pub fn total_hits(&self) -> usize {
        self.hits
            .lock()
            .expect("couldn't acquire mock lock")
            .values()
            .sum()
    }

    fn next_response(&self, locator: &EntityLocator) -> Option<MockResponse> {
        *self
            .hits
            .lock()
            .expect("couldn't acquire mock lock")
            .entry(locator.href().clone())
            .or_default() += 1;

        let mut responses = self.responses.lock().expect("couldn't acquire mock lock");
        let queue = responses.get_mut(locator.href())?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn respond<T>(
        &self,
        locator: &EntityLocator,
        extract: impl FnOnce(MockResponse) -> Result<T, MockResponse>,
    ) -> FetchOutcome<T> {
        match self.next_response(locator) {
            None | Some(MockResponse::Absent) => FetchOutcome::Absent,
            Some(MockResponse::Migrated(migration)) => FetchOutcome::Migrated(migration),
            Some(MockResponse::Failed(status)) => {
                FetchOutcome::Failed(FetchError::UnexpectedStatus {
                    href: locator.href().clone(),
                    status,
                })
            },
            Some(response) => match extract(response) {
                Ok(entity) => FetchOutcome::Success(entity),
                Err(response) => panic!(
                    "expected {} response for {}, found {response:?}",
                    locator.kind(),
                    locator.href()
                ),
            },
        }
    }
}

impl EntitySource for MockCatalog {
    fn locator(&self, kind: EntityKind, id: &str) -> Result<EntityLocator, LocatorError> {
        EntityLocator::for_id(&self.base_url, kind, id)
    }

    fn fetch_component(&self, locator: &EntityLocator) -> FetchOutcome<Component> {
        self.respond(locator, |response| match response {
            MockResponse::Component(component) => Ok(component),
            other => Err(other),
        })
    }

    fn fetch_version(&self, locator: &EntityLocator) -> FetchOutcome<Version> {
        self.respond(locator, |response| match response {
            MockResponse::Version(version) => Ok(version),
            other => Err(other),
        })
    }

    fn fetch_variant(&self, locator: &EntityLocator) -> FetchOutcome<Variant> {
        self.respond(locator, |response| match response {
            MockResponse::Variant(variant) => Ok(variant),
            other => Err(other),
        })
    }

    fn fetch_license(&self, locator: &EntityLocator) -> FetchOutcome<License> {
        self.respond(locator, |response| match response {
            MockResponse::License(license) => Ok(license),
            other => Err(other),
        })
    }
}

fn meta(href: &EntityLocator, links: impl IntoIterator<Item = (&'static str, Url)>) -> Meta {
    Meta {
        href: href.href().clone(),
        links: links
            .into_iter()
            .map(|(rel, href)| Link {
                rel: rel.to_string(),
                href,
            })
            .collect(),
    }
}

pub fn component(locator: &EntityLocator) -> Component {
    Component {
        name: format!("component {}", locator.id()),
        description: None,
        homepage: None,
        meta: meta(locator, []),
    }
}

pub fn version(
    locator: &EntityLocator,
    component: &EntityLocator,
    license: Option<LicenseExpression>,
) -> Version {
    Version {
        version: Some(locator.id().to_string()),
        release_date: None,
        license,
        meta: meta(locator, [(COMPONENT_REL, component.href().clone())]),
    }
}

pub fn variant(
    locator: &EntityLocator,
    version: &EntityLocator,
    license: Option<LicenseExpression>,
) -> Variant {
    Variant {
        external_namespace: Some("mock".to_string()),
        external_id: Some(locator.id().to_string()),
        version: Some(version.id().to_string()),
        license,
        meta: meta(locator, [(VERSION_REL, version.href().clone())]),
    }
}

pub fn license(locator: &EntityLocator, spdx_id: &str) -> License {
    License {
        name: format!("{spdx_id} License"),
        spdx_id: Some(spdx_id.to_string()),
        ownership: None,
        meta: meta(locator, []),
    }
}

pub fn migration(
    from: &EntityLocator,
    kind: MigrationKind,
    successors: &[EntityLocator],
) -> Migration {
    let links = successors
        .iter()
        .map(|successor| (SUCCESSOR_REL, successor.href().clone()));
    Migration {
        successors: successors.to_vec(),
        record: MigrationRecord {
            kind,
            meta: meta(from, links.collect::<Vec<_>>()),
        },
    }
}
