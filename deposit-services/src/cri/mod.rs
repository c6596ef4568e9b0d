//! Critical repository interactions
//!
//! A critical interaction is a guarded read-modify-write of one resource:
//!
//! 1. lock the resource's identity within this process
//! 2. read it fresh from the store
//! 3. check the precondition; stop without side effects if it fails
//! 4. run the critical function on the resource
//! 5. write the resource back and read it again; a version conflict is handed
//!    to the [`ConflictHandler`] for a single retry. An unchanged resource is
//!    not written, so no-op interactions do not produce change notifications.
//! 6. check the postcondition against the written-back state
//!
//! The postcondition is authoritative: completing steps 1 to 5 does not make
//! an interaction successful. Failures never propagate as errors from
//! `perform_critical`; they are reported through [`CriticalResult`].

mod conflict;
mod locks;
mod result;

pub use conflict::{ConflictHandler, ConflictResolution};
pub use locks::LockTable;
pub use result::{BoxError, ConditionViolation, CriticalError, CriticalResult, FailureReason};

use deposit_common::{PassEntity, ResourceId, ResourceStore, ResourceStoreExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Executes critical interactions against a resource store
///
/// Every instance in the process serializes on the global [`LockTable`], so
/// independently built instances still exclude each other. Clones also share
/// the conflict handler and its counters.
#[derive(Clone)]
pub struct CriticalRepositoryInteraction {
    store: Arc<dyn ResourceStore>,
    locks: Arc<LockTable>,
    conflicts: Arc<ConflictHandler>,
}

impl fmt::Debug for CriticalRepositoryInteraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticalRepositoryInteraction")
            .field("locked_resources", &self.locks.len())
            .field("conflicts_handled", &self.conflicts.conflicts_handled())
            .finish()
    }
}

impl CriticalRepositoryInteraction {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self::with_lock_table(store, LockTable::global())
    }

    /// Use a private lock table instead of the process-wide one
    pub fn with_lock_table(store: Arc<dyn ResourceStore>, locks: Arc<LockTable>) -> Self {
        let conflicts = Arc::new(ConflictHandler::new(Arc::clone(&store)));
        Self {
            store,
            locks,
            conflicts,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn conflict_handler(&self) -> &ConflictHandler {
        &self.conflicts
    }

    /// Perform a critical interaction on the resource identified by `id`
    ///
    /// `critical` takes ownership of the freshly read resource and returns it,
    /// possibly mutated, along with its result. It may be invoked a second time
    /// on fresh state when the first write-back conflicts. `postcondition`
    /// sees the resource as stored after the write-back together with the
    /// critical function's result.
    pub async fn perform_critical<T, R, Pre, Post, Crit, Fut>(
        &self,
        id: &ResourceId,
        precondition: Pre,
        postcondition: Post,
        critical: Crit,
    ) -> CriticalResult<R, T>
    where
        T: PassEntity,
        R: Send,
        Pre: Fn(&T) -> bool + Send + Sync,
        Post: FnOnce(&T, &R) -> Result<(), ConditionViolation> + Send,
        Crit: Fn(T) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<(T, R)>> + Send,
    {
        let _guard = self.locks.acquire(id.as_str()).await;
        debug!(resource = %id, kind = %T::KIND, "Acquired resource lock");

        let resource: T = match self.store.read_entity(id).await {
            Ok(resource) => resource,
            Err(e) => return CriticalResult::failed(None, None, CriticalError::Store(e)),
        };

        if !precondition(&resource) {
            debug!(resource = %id, "Precondition failed");
            return CriticalResult::precondition_failed(Some(resource));
        }

        let (updated, result) = match critical(resource.clone()).await {
            Ok(output) => output,
            Err(e) => {
                debug!(resource = %id, error = %e, "Critical function failed");
                return CriticalResult::failed(Some(resource), None, e.into());
            }
        };

        let written = if updated == resource {
            debug!(resource = %id, "Resource unchanged, skipping write-back");
            Ok((updated, result))
        } else {
            match self.store.update_entity(updated).await {
                Ok(()) => self
                    .store
                    .read_entity::<T>(id)
                    .await
                    .map(|current| (current, result))
                    .map_err(CriticalError::Store),
                Err(e) if e.is_conflict() => {
                    match self
                        .conflicts
                        .handle_conflict(&resource, &precondition, &critical)
                        .await
                    {
                        Ok(ConflictResolution::Resolved { resource, result }) => {
                            Ok((resource, result))
                        }
                        Ok(ConflictResolution::PreconditionFailed(fresh)) => {
                            return CriticalResult::precondition_failed(Some(fresh));
                        }
                        Err(err) => Err(err),
                    }
                }
                Err(e) => Err(CriticalError::Store(e)),
            }
        };

        let (current, result) = match written {
            Ok(written) => written,
            Err(err) => {
                debug!(resource = %id, error = %err, "Write-back failed");
                return CriticalResult::failed(Some(resource), None, err);
            }
        };

        match postcondition(&current, &result) {
            Ok(()) => {
                debug!(resource = %id, version = ?current.version(), "Critical interaction succeeded");
                CriticalResult::succeeded(current, result)
            }
            Err(violation) => {
                debug!(resource = %id, violation = %violation, "Postcondition failed");
                CriticalResult::failed(
                    Some(current),
                    Some(result),
                    CriticalError::Postcondition(violation),
                )
            }
        }
    }
}
