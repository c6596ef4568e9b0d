//! Single-shot recovery from optimistic-concurrency conflicts

use deposit_common::{PassEntity, ResourceStore, ResourceStoreExt, StoreError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::result::CriticalError;

/// Outcome of a conflict recovery attempt
#[derive(Debug)]
pub enum ConflictResolution<T, R> {
    /// The update was re-applied; `resource` is the state after write-back
    Resolved { resource: T, result: R },
    /// The fresh state no longer satisfies the precondition
    PreconditionFailed(T),
}

/// Re-reads a resource after a conflicting write, re-validates the
/// precondition against the fresh state and re-applies the critical function.
///
/// Exactly one recovery attempt is made per conflict: a second conflict is
/// returned to the caller as `CriticalError::Conflict`.
pub struct ConflictHandler {
    store: Arc<dyn ResourceStore>,
    handled: AtomicU64,
}

impl ConflictHandler {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            handled: AtomicU64::new(0),
        }
    }

    /// Number of conflicts this handler has been asked to resolve
    pub fn conflicts_handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }

    pub async fn handle_conflict<T, R, Pre, Crit, Fut>(
        &self,
        stale: &T,
        precondition: &Pre,
        critical: &Crit,
    ) -> Result<ConflictResolution<T, R>, CriticalError>
    where
        T: PassEntity,
        Pre: Fn(&T) -> bool + Sync,
        Crit: Fn(T) -> Fut + Sync,
        Fut: Future<Output = anyhow::Result<(T, R)>> + Send,
    {
        self.handled.fetch_add(1, Ordering::SeqCst);

        let id = stale
            .id()
            .cloned()
            .ok_or(CriticalError::Store(StoreError::MissingId))?;
        warn!(
            resource = %id,
            stale_version = ?stale.version(),
            "Version conflict on write-back, retrying once against fresh state"
        );

        let fresh: T = self
            .store
            .read_entity(&id)
            .await
            .map_err(CriticalError::Store)?;

        if !precondition(&fresh) {
            debug!(resource = %id, "Precondition no longer holds after conflict");
            return Ok(ConflictResolution::PreconditionFailed(fresh));
        }

        let (updated, result) = critical(fresh.clone()).await?;
        if updated == fresh {
            return Ok(ConflictResolution::Resolved {
                resource: updated,
                result,
            });
        }

        self.store
            .update_entity(updated)
            .await
            .map_err(CriticalError::from_store)?;

        let resource: T = self
            .store
            .read_entity(&id)
            .await
            .map_err(CriticalError::Store)?;

        debug!(resource = %id, version = ?resource.version(), "Conflict resolved");
        Ok(ConflictResolution::Resolved { resource, result })
    }
}
