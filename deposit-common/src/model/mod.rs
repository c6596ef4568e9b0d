//! Entity model shared by the store and the deposit services
//!
//! Every persisted entity carries an identity (`ResourceId`) and an opaque
//! version tag used for optimistic concurrency. `Resource` is the closed set
//! of entity shapes the store understands; `PassEntity` lets callers work with
//! a concrete shape while the store moves `Resource` values around.

mod entities;
mod status;

pub use entities::{
    relation, Deposit, File, Funder, Grant, Journal, Publication, Repository, RepositoryCopy,
    Submission, User,
};
pub use status::{
    AggregatedDepositStatus, CopyStatus, DepositStatus, FileRole, IntegrationType,
    SubmissionSource,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::StoreError;

/// Identity (URI) of a persisted resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Contract every concrete entity shape fulfils
pub trait PassEntity:
    Clone
    + PartialEq
    + fmt::Debug
    + Send
    + Sync
    + 'static
    + Into<Resource>
    + TryFrom<Resource, Error = StoreError>
{
    /// Kind tag of this entity shape
    const KIND: ResourceKind;

    fn id(&self) -> Option<&ResourceId>;

    fn set_id(&mut self, id: ResourceId);

    /// Optimistic-concurrency version tag, set by the store
    fn version(&self) -> Option<&str>;

    fn set_version(&mut self, version: Option<String>);

    /// Outgoing references as (relation, target) pairs
    fn references(&self) -> Vec<(&'static str, ResourceId)>;
}

macro_rules! resources {
    ($($variant:ident => $path:literal),+ $(,)?) => {
        /// Kind tag of a persisted resource
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ResourceKind {
            $($variant),+
        }

        impl ResourceKind {
            /// All kinds, in declaration order
            pub const ALL: &'static [ResourceKind] = &[$(ResourceKind::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ResourceKind::$variant => stringify!($variant)),+
                }
            }

            /// Path segment used when minting identifiers for this kind
            pub fn path(&self) -> &'static str {
                match self {
                    $(ResourceKind::$variant => $path),+
                }
            }
        }

        impl fmt::Display for ResourceKind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for ResourceKind {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(ResourceKind::$variant),)+
                    other => Err(StoreError::Storage(format!("Unknown resource kind: {}", other))),
                }
            }
        }

        /// Any persisted entity
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "@type")]
        pub enum Resource {
            $($variant($variant)),+
        }

        impl Resource {
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(Resource::$variant(_) => ResourceKind::$variant),+
                }
            }

            pub fn id(&self) -> Option<&ResourceId> {
                match self {
                    $(Resource::$variant(r) => r.id.as_ref()),+
                }
            }

            pub fn set_id(&mut self, id: ResourceId) {
                match self {
                    $(Resource::$variant(r) => r.id = Some(id)),+
                }
            }

            pub fn version(&self) -> Option<&str> {
                match self {
                    $(Resource::$variant(r) => r.version.as_deref()),+
                }
            }

            pub fn set_version(&mut self, version: Option<String>) {
                match self {
                    $(Resource::$variant(r) => r.version = version),+
                }
            }

            pub fn references(&self) -> Vec<(&'static str, ResourceId)> {
                match self {
                    $(Resource::$variant(r) => r.references()),+
                }
            }
        }

        $(
            impl From<$variant> for Resource {
                fn from(entity: $variant) -> Self {
                    Resource::$variant(entity)
                }
            }

            impl TryFrom<Resource> for $variant {
                type Error = StoreError;

                fn try_from(resource: Resource) -> Result<Self, Self::Error> {
                    match resource {
                        Resource::$variant(entity) => Ok(entity),
                        other => Err(StoreError::KindMismatch {
                            id: other.id().cloned(),
                            expected: ResourceKind::$variant,
                            actual: other.kind(),
                        }),
                    }
                }
            }

            impl PassEntity for $variant {
                const KIND: ResourceKind = ResourceKind::$variant;

                fn id(&self) -> Option<&ResourceId> {
                    self.id.as_ref()
                }

                fn set_id(&mut self, id: ResourceId) {
                    self.id = Some(id);
                }

                fn version(&self) -> Option<&str> {
                    self.version.as_deref()
                }

                fn set_version(&mut self, version: Option<String>) {
                    self.version = version;
                }

                fn references(&self) -> Vec<(&'static str, ResourceId)> {
                    $variant::references(self)
                }
            }
        )+
    };
}

resources! {
    Submission => "submissions",
    Deposit => "deposits",
    RepositoryCopy => "repositoryCopies",
    Repository => "repositories",
    File => "files",
    User => "users",
    Grant => "grants",
    Funder => "funders",
    Publication => "publications",
    Journal => "journals",
}
