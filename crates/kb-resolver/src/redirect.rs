//! Following migrations to the current incarnation of an entity.

use std::thread;

use kb_client::{EntityLocator, FetchError, FetchOutcome, Migration, MigrationRecord};
use tracing::{debug, instrument, warn};

use crate::retry::{RetryInterval, RetryIntervalStrategy};

/// Final outcome of following an entity through its migrations.
#[derive(Debug)]
pub enum Resolution<T> {
    Success(T),
    Absent,
    Failed(FetchError),
    /// The hop limit was reached while the entity was still migrating.
    /// Carries the last migration observed, i.e. the latest known position
    /// of the entity.
    Unresolved(Migration),
}

/// A [`Resolution`] together with every migration followed to reach it,
/// oldest first.
#[derive(Debug)]
pub struct ResolutionResult<T> {
    pub outcome: Resolution<T>,
    pub migration_history: Vec<MigrationRecord>,
}

impl<T> ResolutionResult<T> {
    fn new(outcome: Resolution<T>, migration_history: Vec<MigrationRecord>) -> Self {
        Self {
            outcome,
            migration_history,
        }
    }

    pub fn entity(&self) -> Option<&T> {
        match &self.outcome {
            Resolution::Success(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn is_migrated(&self) -> bool {
        !self.migration_history.is_empty()
    }

    /// Collapse to the resolved entity and its history.
    ///
    /// Absent and unresolved entities are `None`; only fetch failures are
    /// errors.
    pub fn into_found(self) -> Result<Option<(T, Vec<MigrationRecord>)>, FetchError> {
        match self.outcome {
            Resolution::Success(entity) => Ok(Some((entity, self.migration_history))),
            Resolution::Absent | Resolution::Unresolved(_) => Ok(None),
            Resolution::Failed(err) => Err(err),
        }
    }
}

/// Follows merge and split migrations up to `max_attempts` hops.
///
/// Splits are followed to their first successor.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    max_attempts: u32,
    retry_interval: RetryInterval,
}

impl RedirectResolver {
    pub fn new(max_attempts: u32, retry_interval: RetryInterval) -> Self {
        Self {
            max_attempts,
            retry_interval,
        }
    }

    /// Fetch `locator` with `fetch`, following migrations until the entity
    /// settles or `max_attempts` migrations have been followed.
    ///
    /// The initial fetch always happens, even with `max_attempts == 0`.
    /// The history never holds more than `max_attempts` records.
    #[instrument(skip_all, fields(locator = %locator, max_attempts = self.max_attempts))]
    pub fn resolve<T, F>(&self, locator: &EntityLocator, mut fetch: F) -> ResolutionResult<T>
    where
        F: FnMut(&EntityLocator) -> FetchOutcome<T>,
    {
        let mut current = locator.clone();
        let mut history: Vec<MigrationRecord> = Vec::new();

        loop {
            let migration = match fetch(&current) {
                FetchOutcome::Success(entity) => {
                    return ResolutionResult::new(Resolution::Success(entity), history);
                },
                FetchOutcome::Absent => {
                    debug!(%current, "entity is absent");
                    return ResolutionResult::new(Resolution::Absent, history);
                },
                FetchOutcome::Failed(err) => {
                    debug!(%current, error = %err, "fetch failed");
                    return ResolutionResult::new(Resolution::Failed(err), history);
                },
                FetchOutcome::Migrated(migration) => migration,
            };

            let Some(next) = migration.successors.first().cloned() else {
                debug!(%current, "migration has no successors, treating entity as absent");
                return ResolutionResult::new(Resolution::Absent, history);
            };

            if history.len() >= self.max_attempts as usize {
                warn!(
                    %current,
                    hops = history.len(),
                    "migration hops exhausted, returning latest known position"
                );
                return ResolutionResult::new(Resolution::Unresolved(migration), history);
            }

            if migration.successors.len() > 1 {
                debug!(
                    %current,
                    successors = migration.successors.len(),
                    chosen = %next,
                    "entity was split, following first successor"
                );
            }

            let hop = u32::try_from(history.len()).unwrap_or(u32::MAX);
            history.push(migration.record);
            debug!(from = %current, to = %next, hop, "following migration");

            let wait = self.retry_interval.determine_interval(hop);
            if !wait.is_zero() {
                thread::sleep(wait);
            }
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use http::StatusCode;
    use kb_client::{EntityKind, MigrationKind};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::mock::{MockCatalog, MockResponse, migration};
    use crate::retry::FixedInterval;
    use crate::source::EntitySource;
    use crate::test_helpers::recording_subscriber;

    fn resolver(max_attempts: u32) -> RedirectResolver {
        RedirectResolver::new(max_attempts, RetryInterval::none())
    }

    /// A component with versions v1..=v3 where v1 merged into v2 and v2
    /// merged into v3.
    fn version_chain(catalog: &MockCatalog) -> [EntityLocator; 3] {
        let component = catalog.add_component("c1");
        let chain = ["v1", "v2", "v3"].map(|id| catalog.add_version(id, &component));
        catalog.merge(&chain[0], &chain[1]);
        catalog.merge(&chain[1], &chain[2]);
        chain
    }

    #[test]
    fn unmigrated_entity_resolves_directly() {
        let catalog = MockCatalog::new();
        let component = catalog.add_component("c1");

        let result = resolver(3).resolve(&component, |l| catalog.fetch_component(l));

        let resolved = result.entity().unwrap();
        assert_eq!(resolved.meta.href, *component.href());
        assert!(!result.is_migrated());
        assert_eq!(catalog.hits(&component), 1);
    }

    #[test]
    fn follows_merge_chain_to_current_entity() {
        let catalog = MockCatalog::new();
        let [v1, v2, v3] = version_chain(&catalog);

        let result = resolver(3).resolve(&v1, |l| catalog.fetch_version(l));

        assert_eq!(result.entity().unwrap().meta.href, *v3.href());
        let kinds: Vec<_> = result.migration_history.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![MigrationKind::Merge, MigrationKind::Merge]);
        assert_eq!(result.migration_history[0].meta.href, *v1.href());
        assert_eq!(result.migration_history[1].meta.href, *v2.href());
        for locator in [&v1, &v2, &v3] {
            assert_eq!(catalog.hits(locator), 1);
        }
    }

    #[test]
    fn exhaustion_returns_latest_known_position() {
        let catalog = MockCatalog::new();
        let [v1, v2, v3] = version_chain(&catalog);

        let result = resolver(1).resolve(&v1, |l| catalog.fetch_version(l));

        let Resolution::Unresolved(latest) = &result.outcome else {
            panic!("expected unresolved outcome, got {:?}", result.outcome);
        };
        assert_eq!(latest.record.meta.href, *v2.href());
        assert_eq!(latest.successors, vec![v3.clone()]);
        assert_eq!(result.migration_history.len(), 1);
        assert_eq!(catalog.hits(&v3), 0);
    }

    #[test]
    fn zero_attempts_still_fetches_once() {
        let catalog = MockCatalog::new();
        let [v1, v2, _] = version_chain(&catalog);

        let result = resolver(0).resolve(&v1, |l| catalog.fetch_version(l));

        assert!(matches!(result.outcome, Resolution::Unresolved(_)));
        assert!(result.migration_history.is_empty());
        assert_eq!(catalog.hits(&v1), 1);
        assert_eq!(catalog.hits(&v2), 0);

        let direct = catalog.add_version("v9", &catalog.locate(EntityKind::Component, "c1"));
        let result = resolver(0).resolve(&direct, |l| catalog.fetch_version(l));
        assert!(result.entity().is_some());
    }

    #[test]
    fn migration_cycle_terminates() {
        let catalog = MockCatalog::new();
        let component = catalog.add_component("c1");
        let a = catalog.add_version("a", &component);
        let b = catalog.add_version("b", &component);
        catalog.merge(&a, &b);
        catalog.merge(&b, &a);

        let result = resolver(4).resolve(&a, |l| catalog.fetch_version(l));

        assert!(matches!(result.outcome, Resolution::Unresolved(_)));
        assert_eq!(result.migration_history.len(), 4);
        assert_eq!(catalog.total_hits(), 5);
    }

    #[test]
    fn split_follows_first_successor() {
        let catalog = MockCatalog::new();
        let component = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &component);
        let v2 = catalog.add_version("v2", &component);
        let v3 = catalog.add_version("v3", &component);
        catalog.split(&v1, &[v2.clone(), v3.clone()]);

        let result = resolver(3).resolve(&v1, |l| catalog.fetch_version(l));

        assert_eq!(result.entity().unwrap().meta.href, *v2.href());
        assert_eq!(result.migration_history[0].kind, MigrationKind::Split);
        assert_eq!(catalog.hits(&v3), 0);
    }

    #[test]
    fn migration_without_successors_is_absent() {
        let catalog = MockCatalog::new();
        let component = catalog.add_component("c1");
        let v1 = catalog.add_version("v1", &component);
        catalog.set_response(
            &v1,
            MockResponse::Migrated(migration(&v1, MigrationKind::Merge, &[])),
        );

        let result = resolver(3).resolve(&v1, |l| catalog.fetch_version(l));

        assert!(matches!(result.outcome, Resolution::Absent));
        assert!(result.migration_history.is_empty());
    }

    #[test]
    fn failure_after_migration_keeps_history() {
        let catalog = MockCatalog::new();
        let [v1, v2, _] = version_chain(&catalog);
        catalog.set_failed(&v2, StatusCode::INTERNAL_SERVER_ERROR);

        let result = resolver(3).resolve(&v1, |l| catalog.fetch_version(l));

        assert!(matches!(
            result.outcome,
            Resolution::Failed(FetchError::UnexpectedStatus { status, .. })
                if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert_eq!(result.migration_history.len(), 1);
    }

    #[test]
    fn failure_is_not_retried() {
        let catalog = MockCatalog::new();
        let c1 = catalog.locate(EntityKind::Component, "c1");
        catalog.set_failed(&c1, StatusCode::SERVICE_UNAVAILABLE);

        let result = resolver(3).resolve(&c1, |l| catalog.fetch_component(l));

        assert!(matches!(result.outcome, Resolution::Failed(_)));
        assert_eq!(catalog.hits(&c1), 1);
    }

    #[test]
    fn absent_successor_is_absent() {
        let catalog = MockCatalog::new();
        let [v1, v2, _] = version_chain(&catalog);
        catalog.set_absent(&v2);

        let result = resolver(3).resolve(&v1, |l| catalog.fetch_version(l));

        assert!(matches!(result.outcome, Resolution::Absent));
        assert_eq!(result.migration_history.len(), 1);
        assert!(result.into_found().unwrap().is_none());
    }

    #[test]
    fn waits_between_hops() {
        let catalog = MockCatalog::new();
        let [v1, ..] = version_chain(&catalog);
        let resolver =
            RedirectResolver::new(3, FixedInterval::new(Duration::from_millis(25)).into());

        let started = Instant::now();
        let result = resolver.resolve(&v1, |l| catalog.fetch_version(l));

        assert!(result.entity().is_some());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn exhaustion_is_warned_with_hop_count() {
        let catalog = MockCatalog::new();
        let [v1, v2, v3] = version_chain(&catalog);
        let (subscriber, log) = recording_subscriber(tracing::Level::DEBUG);

        tracing::subscriber::with_default(subscriber, || {
            resolver(1).resolve(&v1, |l| catalog.fetch_version(l));
        });

        let hops = log.matching("following migration");
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].level, tracing::Level::DEBUG);
        assert_eq!(hops[0].field("hop"), Some("0"));
        assert_eq!(hops[0].field("to"), Some(v2.to_string().as_str()));

        let warnings = log.at_level(tracing::Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.starts_with("migration hops exhausted"));
        assert_eq!(warnings[0].field("hops"), Some("1"));
        assert_eq!(warnings[0].field("current"), Some(v2.to_string().as_str()));
        assert_eq!(catalog.hits(&v3), 0);
    }

    #[test]
    fn settled_resolution_emits_no_warning() {
        let catalog = MockCatalog::new();
        let [v1, ..] = version_chain(&catalog);
        let (subscriber, log) = recording_subscriber(tracing::Level::WARN);

        tracing::subscriber::with_default(subscriber, || {
            let result = resolver(3).resolve(&v1, |l| catalog.fetch_version(l));
            assert!(result.entity().is_some());
        });

        assert!(log.events().is_empty(), "events: {:?}", log.events());
    }

    proptest! {
        #[test]
        fn history_is_bounded_by_max_attempts(chain_length in 0..8usize, max_attempts in 0..8u32) {
            let catalog = MockCatalog::new();
            let component = catalog.add_component("c1");
            let chain: Vec<_> = (0..=chain_length)
                .map(|i| catalog.add_version(&format!("v{i}"), &component))
                .collect();
            for pair in chain.windows(2) {
                catalog.merge(&pair[0], &pair[1]);
            }

            let result = resolver(max_attempts).resolve(&chain[0], |l| catalog.fetch_version(l));

            if chain_length <= max_attempts as usize {
                prop_assert_eq!(&result.entity().unwrap().meta.href, chain[chain_length].href());
                prop_assert_eq!(result.migration_history.len(), chain_length);
            } else {
                prop_assert!(matches!(result.outcome, Resolution::Unresolved(_)));
                prop_assert_eq!(result.migration_history.len(), max_attempts as usize);
            }
        }
    }
}
