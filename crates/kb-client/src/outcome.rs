//! The result of a single catalog lookup.

use crate::error::FetchError;
use crate::model::{EntityLocator, Meta};

/// How the catalog reported a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// `301 Moved Permanently`: the entity was merged into one successor.
    Merge,
    /// `300 Multiple Choices`: the entity was split into several successors.
    Split,
}

/// Snapshot of a migration response, kept for audit history only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub kind: MigrationKind,
    pub meta: Meta,
}

/// A migration observed while fetching an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Successor locators in the order the server returned them.
    pub successors: Vec<EntityLocator>,
    pub record: MigrationRecord,
}

/// Outcome of exactly one fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// The entity exists and was not migrated.
    Success(T),
    /// The entity moved to one (merge) or many (split) successors.
    Migrated(Migration),
    /// The entity does not exist, or the endpoint tolerated the response as
    /// "not available".
    Absent,
    Failed(FetchError),
}

impl<T> FetchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}
