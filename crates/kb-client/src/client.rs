//! Catalog client: authorized requests and per-endpoint status mapping.

use std::fmt::Debug;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{AuthorizationCache, Credential, LicenseKeyAuthenticator};
use crate::config::ClientConfig;
use crate::error::{ClientError, FetchError, LocatorError};
use crate::model::{
    CatalogEntity,
    Component,
    EntityKind,
    EntityLocator,
    License,
    Meta,
    SUCCESSOR_REL,
    Variant,
    Version,
};
use crate::outcome::{FetchOutcome, Migration, MigrationKind, MigrationRecord};
use crate::transport::{CatalogRequest, HttpExecutor, RawResponse, ReqwestExecutor};

/// A client for the knowledge catalog.
///
/// Handles:
/// - bearer credentials from a shared [`AuthorizationCache`]
/// - one re-authentication and retry when a request comes back `401`
/// - mapping each endpoint's statuses to a [`FetchOutcome`]
#[derive(Clone)]
pub struct CatalogClient {
    executor: Arc<dyn HttpExecutor>,
    authorization: Arc<AuthorizationCache>,
    base_url: Url,
}

impl Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a client that authenticates with the configured license key.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let executor: Arc<dyn HttpExecutor> = Arc::new(ReqwestExecutor::new(config)?);
        let authenticator = LicenseKeyAuthenticator::new(
            &config.base_url,
            config.license_key.clone(),
            Arc::clone(&executor),
        )?;
        Ok(Self::with_parts(
            config.base_url.clone(),
            executor,
            Arc::new(AuthorizationCache::new(authenticator)),
        ))
    }

    /// Assemble a client from an existing transport and credential cache.
    ///
    /// Clients sharing one cache share one credential.
    pub fn with_parts(
        base_url: Url,
        executor: Arc<dyn HttpExecutor>,
        authorization: Arc<AuthorizationCache>,
    ) -> Self {
        Self {
            executor,
            authorization,
            base_url,
        }
    }

    /// The locator of entity `id` of the given kind.
    pub fn locator(
        &self,
        kind: EntityKind,
        id: impl AsRef<str>,
    ) -> Result<EntityLocator, LocatorError> {
        EntityLocator::for_id(&self.base_url, kind, id)
    }

    pub fn fetch_component(&self, locator: &EntityLocator) -> FetchOutcome<Component> {
        self.fetch_entity(locator)
    }

    pub fn fetch_version(&self, locator: &EntityLocator) -> FetchOutcome<Version> {
        self.fetch_entity(locator)
    }

    pub fn fetch_variant(&self, locator: &EntityLocator) -> FetchOutcome<Variant> {
        self.fetch_entity(locator)
    }

    pub fn fetch_license(&self, locator: &EntityLocator) -> FetchOutcome<License> {
        self.fetch_entity(locator)
    }

    /// Fetch one entity without following migrations.
    #[instrument(skip_all, fields(locator = %locator))]
    pub fn fetch_entity<T: CatalogEntity>(&self, locator: &EntityLocator) -> FetchOutcome<T> {
        let request = CatalogRequest::new(locator.method().clone(), locator.href().clone());
        match self.execute_authorized(&request) {
            Ok(response) => map_response(locator, T::KIND, response),
            Err(err) => FetchOutcome::Failed(err),
        }
    }

    /// Execute `request` with the current credential, re-authenticating and
    /// retrying once if the catalog answers `401`.
    pub fn execute_authorized(&self, request: &CatalogRequest) -> Result<RawResponse, FetchError> {
        let credential = self
            .authorization
            .get_or_create()
            .ok_or(FetchError::Unauthenticated)?;
        let response = self.send(request, &credential)?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(url = %request.url, "credential rejected, re-authenticating");
        let credential = self
            .authorization
            .invalidate_and_create()
            .ok_or(FetchError::Unauthenticated)?;
        self.send(request, &credential)
    }

    fn send(
        &self,
        request: &CatalogRequest,
        credential: &Credential,
    ) -> Result<RawResponse, FetchError> {
        let authorization = credential
            .bearer_header()
            .map_err(|_| FetchError::Unauthenticated)?;
        let request = request.clone().with_authorization(authorization);
        self.executor
            .execute(&request)
            .map_err(|source| FetchError::Transport {
                href: request.url.clone(),
                source,
            })
    }
}

/// Statuses an endpoint answers for entities that exist but are not
/// available to the caller. They are reported as [`FetchOutcome::Absent`].
fn tolerated_statuses(kind: EntityKind) -> &'static [StatusCode] {
    match kind {
        EntityKind::License => &[StatusCode::PAYMENT_REQUIRED, StatusCode::FORBIDDEN],
        EntityKind::Component | EntityKind::Version | EntityKind::Variant => {
            &[StatusCode::FORBIDDEN]
        },
    }
}

fn map_response<T: CatalogEntity>(
    locator: &EntityLocator,
    kind: EntityKind,
    response: RawResponse,
) -> FetchOutcome<T> {
    match response.status {
        StatusCode::OK => match serde_json::from_slice::<T>(&response.body) {
            Ok(entity) => FetchOutcome::Success(entity),
            Err(source) => FetchOutcome::Failed(FetchError::Deserialize {
                href: locator.href().clone(),
                source,
            }),
        },
        StatusCode::NOT_FOUND => FetchOutcome::Absent,
        StatusCode::MOVED_PERMANENTLY => map_migration(locator, &response, MigrationKind::Merge),
        StatusCode::MULTIPLE_CHOICES => map_migration(locator, &response, MigrationKind::Split),
        status if tolerated_statuses(kind).contains(&status) => {
            debug!(%status, %locator, "tolerated status, treating entity as absent");
            FetchOutcome::Absent
        },
        status => FetchOutcome::Failed(FetchError::UnexpectedStatus {
            href: locator.href().clone(),
            status,
        }),
    }
}

#[derive(Deserialize)]
struct MigrationBody {
    meta: Meta,
}

/// Successors come from the body's `successor` links in server order. A merge
/// without successor links falls back to its `Location` header. An empty body
/// carries no links; any other body must parse.
fn map_migration<T>(
    locator: &EntityLocator,
    response: &RawResponse,
    kind: MigrationKind,
) -> FetchOutcome<T> {
    let meta = if response.body.trim_ascii().is_empty() {
        Meta {
            href: locator.href().clone(),
            links: vec![],
        }
    } else {
        match serde_json::from_slice::<MigrationBody>(&response.body) {
            Ok(body) => body.meta,
            Err(source) => {
                return FetchOutcome::Failed(FetchError::Deserialize {
                    href: locator.href().clone(),
                    source,
                });
            },
        }
    };

    let mut successor_hrefs = meta.links_with(SUCCESSOR_REL).cloned().collect::<Vec<_>>();
    if successor_hrefs.is_empty() && kind == MigrationKind::Merge {
        successor_hrefs.extend(response.location(locator.href()));
    }

    let successors = successor_hrefs
        .into_iter()
        .map(|href| EntityLocator::from_href(locator.kind(), href))
        .collect::<Result<Vec<_>, _>>();

    match successors {
        Ok(successors) => {
            debug!(
                %locator,
                ?kind,
                n_successors = successors.len(),
                "entity migrated"
            );
            FetchOutcome::Migrated(Migration {
                successors,
                record: MigrationRecord { kind, meta },
            })
        },
        Err(source) => FetchOutcome::Failed(FetchError::InvalidMigration {
            href: locator.href().clone(),
            source,
        }),
    }
}
