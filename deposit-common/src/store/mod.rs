//! Resource store contract
//!
//! The store is a key-value-like repository of entities addressed by URI.
//! Every entity carries a version tag; `update` rejects writes whose tag is
//! stale with `StoreError::Conflict`. There is no locking across processes:
//! version tags are the only cross-process coordination mechanism.
//!
//! Inverse references (`incoming`) let callers enumerate e.g. the deposits of
//! a submission without a general query index.

mod memory;
mod retry;
#[cfg(feature = "sqlx")]
mod sqlite;

pub use memory::InMemoryResourceStore;
pub use retry::retry_on_lock;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteResourceStore;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::model::{PassEntity, Resource, ResourceId, ResourceKind};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Inverse references of a resource: relation name -> referring resources
pub type IncomingLinks = HashMap<String, HashSet<ResourceId>>;

/// Errors from the resource store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Resource not found: {0}")]
    NotFound(ResourceId),

    #[error("Resource already exists: {0}")]
    AlreadyExists(ResourceId),

    /// The written version tag is not the current one
    #[error("Version conflict on {id}: wrote against version {expected:?}, current version is {actual:?}")]
    Conflict {
        id: ResourceId,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("Resource {id:?} is a {actual}, expected a {expected}")]
    KindMismatch {
        id: Option<ResourceId>,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    #[error("Resource has no identity")]
    MissingId,

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// True for optimistic-concurrency conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// The trait all storage backends implement
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read the current state of a resource, including its version tag
    async fn read(&self, id: &ResourceId) -> StoreResult<Resource>;

    /// Persist a new resource. An identity is minted when the resource has none.
    async fn create(&self, resource: Resource) -> StoreResult<ResourceId>;

    /// Replace a resource. Fails with `StoreError::Conflict` when the
    /// resource's version tag is not the current one.
    async fn update(&self, resource: Resource) -> StoreResult<()>;

    async fn delete(&self, id: &ResourceId) -> StoreResult<()>;

    /// Resources referring to `id`, grouped by relation name
    async fn incoming(&self, id: &ResourceId) -> StoreResult<IncomingLinks>;
}

/// Typed conveniences over any `ResourceStore`
#[async_trait]
pub trait ResourceStoreExt: ResourceStore {
    async fn read_entity<T: PassEntity>(&self, id: &ResourceId) -> StoreResult<T> {
        T::try_from(self.read(id).await?)
    }

    async fn create_entity<T: PassEntity>(&self, entity: T) -> StoreResult<ResourceId> {
        self.create(entity.into()).await
    }

    /// Create, then read back so the caller holds the stored version tag
    async fn create_and_read<T: PassEntity>(&self, entity: T) -> StoreResult<T> {
        let id = self.create(entity.into()).await?;
        self.read_entity(&id).await
    }

    async fn update_entity<T: PassEntity>(&self, entity: T) -> StoreResult<()> {
        self.update(entity.into()).await
    }

    /// Resources referring to `id` through one relation, sorted by identity
    async fn incoming_by(&self, id: &ResourceId, relation: &str) -> StoreResult<Vec<ResourceId>> {
        let mut ids: Vec<ResourceId> = self
            .incoming(id)
            .await?
            .remove(relation)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}

impl<S: ResourceStore + ?Sized> ResourceStoreExt for S {}

/// Mint a fresh identifier for a resource of `kind` under `base_uri`
pub fn mint_id(base_uri: &str, kind: ResourceKind) -> ResourceId {
    ResourceId::new(format!(
        "{}/{}/{}",
        base_uri.trim_end_matches('/'),
        kind.path(),
        uuid::Uuid::new_v4()
    ))
}

/// Version tag following `current`
pub(crate) fn next_version(current: Option<&str>) -> String {
    current
        .and_then(|v| v.parse::<u64>().ok())
        .map(|v| v + 1)
        .unwrap_or(1)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_id_uses_kind_path() {
        let id = mint_id("http://localhost:8080/fcrepo/", ResourceKind::RepositoryCopy);
        assert!(id
            .as_str()
            .starts_with("http://localhost:8080/fcrepo/repositoryCopies/"));
    }

    #[test]
    fn test_next_version_increments() {
        assert_eq!(next_version(None), "1");
        assert_eq!(next_version(Some("1")), "2");
        assert_eq!(next_version(Some("41")), "42");
    }

    #[test]
    fn test_conflict_predicate() {
        let err = StoreError::Conflict {
            id: ResourceId::from("d/1"),
            expected: Some("1".into()),
            actual: Some("2".into()),
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("d/1"));
    }
}
