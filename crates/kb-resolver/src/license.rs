//! Materializing license expressions.

use kb_client::{EntityKind, EntityLocator, LicenseExpression, LicenseNode};
use tracing::{debug, instrument};

use crate::error::ResolveError;
use crate::redirect::RedirectResolver;
use crate::source::EntitySource;

/// Resolves every license referenced by an expression, following each
/// license's migrations.
///
/// A definition is only materialized if all of its licenses are: a single
/// absent license, or an expression nested deeper than `max_depth`, makes
/// the whole result `None`.
#[derive(Debug, Clone)]
pub struct LicenseDefinitionResolver {
    redirect: RedirectResolver,
    max_depth: u32,
}

impl LicenseDefinitionResolver {
    pub fn new(redirect: RedirectResolver, max_depth: u32) -> Self {
        Self {
            redirect,
            max_depth,
        }
    }

    #[instrument(skip_all, fields(max_depth = self.max_depth))]
    pub fn resolve(
        &self,
        source: &impl EntitySource,
        expression: &LicenseExpression,
    ) -> Result<Option<LicenseNode>, ResolveError> {
        self.resolve_at(source, expression, 0)
    }

    fn resolve_at(
        &self,
        source: &impl EntitySource,
        expression: &LicenseExpression,
        depth: u32,
    ) -> Result<Option<LicenseNode>, ResolveError> {
        if depth > self.max_depth {
            debug!(depth, "license expression nested too deeply");
            return Ok(None);
        }

        match expression {
            LicenseExpression::License { license } => {
                let locator = EntityLocator::from_href(EntityKind::License, license.clone())?;
                let resolved = self
                    .redirect
                    .resolve(&locator, |l| source.fetch_license(l))
                    .into_found()?;
                if resolved.is_none() {
                    debug!(%locator, "license could not be resolved");
                }
                Ok(resolved.map(|(license, _)| LicenseNode::Leaf(license)))
            },
            LicenseExpression::Definition { operator, licenses } => {
                let mut children = Vec::with_capacity(licenses.len());
                for child in licenses {
                    let Some(node) = self.resolve_at(source, child, depth + 1)? else {
                        return Ok(None);
                    };
                    children.push(node);
                }
                Ok(Some(LicenseNode::Combinator {
                    operator: *operator,
                    children,
                }))
            },
        }
    }
}
