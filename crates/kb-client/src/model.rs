//! Catalog wire model.
//!
//! Only the parts of each entity that migration resolution and hierarchy
//! reconstruction need are modelled: the entity's own `href`, its links
//! (parents and migration successors) and, where present, its license
//! expression. Unknown fields are ignored.

use std::fmt::{self, Display};

use derive_more::{Display as DeriveDisplay, From};
use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LocatorError;

/// Link relation naming the parent component of a version.
pub const COMPONENT_REL: &str = "component";
/// Link relation naming the parent version of a variant.
pub const VERSION_REL: &str = "version";
/// Link relation naming a migration successor.
pub const SUCCESSOR_REL: &str = "successor";

/// The kinds of entity the catalog serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveDisplay)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[display("component")]
    Component,
    #[display("version")]
    Version,
    #[display("variant")]
    Variant,
    #[display("license")]
    License,
}

impl EntityKind {
    /// Path segment of the collection this kind lives in.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Component => "components",
            EntityKind::Version => "versions",
            EntityKind::Variant => "variants",
            EntityKind::License => "licenses",
        }
    }
}

/// Opaque catalog identifier, the last path segment of an entity href.
#[derive(Debug, Clone, PartialEq, Eq, Hash, DeriveDisplay, From)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId(value.to_string())
    }
}

/// Everything needed to fetch one entity: its kind, id and request target.
///
/// Locators are immutable; following a migration produces a new locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityLocator {
    kind: EntityKind,
    id: EntityId,
    method: Method,
    href: Url,
}

impl EntityLocator {
    /// Build the locator of `{base}/api/{collection}/{id}`.
    pub fn for_id(
        base_url: &Url,
        kind: EntityKind,
        id: impl AsRef<str>,
    ) -> Result<Self, LocatorError> {
        let id = id.as_ref();
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let href = base
            .join(&format!("api/{}/{id}", kind.collection()))
            .map_err(LocatorError::InvalidUrl)?;
        if id.is_empty() {
            return Err(LocatorError::MissingId(href));
        }
        Ok(Self {
            kind,
            id: EntityId::from(id),
            method: Method::GET,
            href,
        })
    }

    /// Parse the locator out of an entity href returned by the catalog.
    pub fn from_href(kind: EntityKind, href: Url) -> Result<Self, LocatorError> {
        let id = href
            .path_segments()
            .and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
            .map(EntityId::from);
        let Some(id) = id else {
            return Err(LocatorError::MissingId(href));
        };
        Ok(Self {
            kind,
            id,
            method: Method::GET,
            href,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn href(&self) -> &Url {
        &self.href
    }
}

impl Display for EntityLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.href)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: Url,
}

/// Self-description attached to every catalog response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub href: Url,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Meta {
    /// The first link with relation `rel`.
    pub fn link(&self, rel: &str) -> Option<&Url> {
        self.links
            .iter()
            .find(|link| link.rel == rel)
            .map(|link| &link.href)
    }

    /// All links with relation `rel`, in server order.
    pub fn links_with(&self, rel: &str) -> impl Iterator<Item = &Url> {
        self.links
            .iter()
            .filter(move |link| link.rel == rel)
            .map(|link| &link.href)
    }
}

/// An entity that can be fetched from the catalog.
pub trait CatalogEntity: DeserializeOwned {
    const KIND: EntityKind;

    fn meta(&self) -> &Meta;

    /// The locator of this entity as the catalog currently knows it.
    fn locator(&self) -> Result<EntityLocator, LocatorError> {
        EntityLocator::from_href(Self::KIND, self.meta().href.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<Url>,
    pub meta: Meta,
}

impl CatalogEntity for Component {
    const KIND: EntityKind = EntityKind::Component;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub license: Option<LicenseExpression>,
    pub meta: Meta,
}

impl Version {
    /// The component this version belongs to.
    ///
    /// A missing or malformed `component` link means the version has no
    /// known parent.
    pub fn component_locator(&self) -> Option<EntityLocator> {
        let href = self.meta.link(COMPONENT_REL)?;
        EntityLocator::from_href(EntityKind::Component, href.clone()).ok()
    }
}

impl CatalogEntity for Version {
    const KIND: EntityKind = EntityKind::Version;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

/// A distribution of a version in some external ecosystem (e.g. a maven
/// coordinate or an npm package).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(default)]
    pub external_namespace: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub license: Option<LicenseExpression>,
    pub meta: Meta,
}

impl Variant {
    /// The version this variant belongs to.
    pub fn version_locator(&self) -> Option<EntityLocator> {
        let href = self.meta.link(VERSION_REL)?;
        EntityLocator::from_href(EntityKind::Version, href.clone()).ok()
    }
}

impl CatalogEntity for Variant {
    const KIND: EntityKind = EntityKind::Variant;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub name: String,
    #[serde(default)]
    pub spdx_id: Option<String>,
    #[serde(default)]
    pub ownership: Option<String>,
    pub meta: Meta,
}

impl CatalogEntity for License {
    const KIND: EntityKind = EntityKind::License;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseOperator {
    #[serde(rename = "CONJUNCTIVE", alias = "AND")]
    And,
    #[serde(rename = "DISJUNCTIVE", alias = "OR")]
    Or,
}

impl Display for LicenseOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseOperator::And => write!(f, "AND"),
            LicenseOperator::Or => write!(f, "OR"),
        }
    }
}

/// A license expression as embedded in versions and variants: a tree whose
/// leaves reference licenses by href.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LicenseExpression {
    License {
        license: Url,
    },
    Definition {
        #[serde(rename = "type")]
        operator: LicenseOperator,
        licenses: Vec<LicenseExpression>,
    },
}

impl LicenseExpression {
    pub fn license(href: Url) -> Self {
        LicenseExpression::License { license: href }
    }

    pub fn all_of(licenses: Vec<LicenseExpression>) -> Self {
        LicenseExpression::Definition {
            operator: LicenseOperator::And,
            licenses,
        }
    }

    pub fn any_of(licenses: Vec<LicenseExpression>) -> Self {
        LicenseExpression::Definition {
            operator: LicenseOperator::Or,
            licenses,
        }
    }
}

/// A fully materialized license expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseNode {
    Leaf(License),
    Combinator {
        operator: LicenseOperator,
        children: Vec<LicenseNode>,
    },
}

impl Display for LicenseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseNode::Leaf(license) => {
                write!(f, "{}", license.spdx_id.as_deref().unwrap_or(&license.name))
            },
            LicenseNode::Combinator { operator, children } => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {operator} ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            },
        }
    }
}
