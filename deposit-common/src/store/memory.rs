//! In-memory resource store
//!
//! Versioned map of resources, used by tests and by the daemon when no
//! database is configured.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{mint_id, next_version, IncomingLinks, ResourceStore, StoreError, StoreResult};
use crate::events::{ChangeKind, NotificationBus, ResourceNotification};
use crate::model::{Resource, ResourceId, ResourceKind};

/// Default base URI for minted identifiers
pub const DEFAULT_BASE_URI: &str = "http://localhost:8080/fcrepo/rest";

pub struct InMemoryResourceStore {
    base_uri: String,
    resources: Mutex<HashMap<ResourceId, Resource>>,
    notifications: Option<NotificationBus>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::with_base_uri(DEFAULT_BASE_URI)
    }

    pub fn with_base_uri(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            resources: Mutex::new(HashMap::new()),
            notifications: None,
        }
    }

    /// Publish a notification to `bus` after every successful mutation
    pub fn with_notifications(mut self, bus: NotificationBus) -> Self {
        self.notifications = Some(bus);
        self
    }

    /// Snapshot of every stored resource of `kind`
    pub fn list(&self, kind: ResourceKind) -> Vec<Resource> {
        let resources = self.lock();
        let mut found: Vec<Resource> = resources
            .values()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id().cmp(&b.id()));
        found
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ResourceId, Resource>> {
        // A panic while holding this lock cannot leave a half-written entry
        self.resources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn announce(&self, id: ResourceId, kind: ResourceKind, change: ChangeKind) {
        if let Some(bus) = &self.notifications {
            bus.publish_lossy(ResourceNotification::new(id, kind, change));
        }
    }
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn read(&self, id: &ResourceId) -> StoreResult<Resource> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn create(&self, mut resource: Resource) -> StoreResult<ResourceId> {
        let kind = resource.kind();
        let id = {
            let mut resources = self.lock();
            let id = match resource.id() {
                Some(id) if resources.contains_key(id) => {
                    return Err(StoreError::AlreadyExists(id.clone()))
                }
                Some(id) => id.clone(),
                None => mint_id(&self.base_uri, kind),
            };
            resource.set_id(id.clone());
            resource.set_version(Some(next_version(None)));
            resources.insert(id.clone(), resource);
            id
        };

        tracing::debug!(resource = %id, kind = %kind, "Created resource");
        self.announce(id.clone(), kind, ChangeKind::Created);
        Ok(id)
    }

    async fn update(&self, mut resource: Resource) -> StoreResult<()> {
        let id = resource.id().cloned().ok_or(StoreError::MissingId)?;
        let kind = resource.kind();
        {
            let mut resources = self.lock();
            let current = resources
                .get(&id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;

            if current.kind() != kind {
                return Err(StoreError::KindMismatch {
                    id: Some(id),
                    expected: current.kind(),
                    actual: kind,
                });
            }
            if current.version() != resource.version() {
                return Err(StoreError::Conflict {
                    id,
                    expected: resource.version().map(str::to_string),
                    actual: current.version().map(str::to_string),
                });
            }

            let version = next_version(current.version());
            resource.set_version(Some(version));
            resources.insert(id.clone(), resource);
        }

        tracing::debug!(resource = %id, kind = %kind, "Updated resource");
        self.announce(id, kind, ChangeKind::Modified);
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> StoreResult<()> {
        let removed = self
            .lock()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.announce(id.clone(), removed.kind(), ChangeKind::Deleted);
        Ok(())
    }

    async fn incoming(&self, id: &ResourceId) -> StoreResult<IncomingLinks> {
        let resources = self.lock();
        let mut links = IncomingLinks::new();
        for (source, resource) in resources.iter() {
            for (relation, target) in resource.references() {
                if &target == id {
                    links
                        .entry(relation.to_string())
                        .or_default()
                        .insert(source.clone());
                }
            }
        }
        Ok(links)
    }
}
