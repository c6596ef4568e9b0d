//! Process-local lock table keyed by resource identity

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Mutex table serializing in-process access to individual resources
///
/// Entries are created on first use and never removed. The table grows with
/// the number of distinct resources touched over the life of the process,
/// which is bounded by submission volume. Deployments with unbounded
/// resource churn would need an eviction scheme.
///
/// Only callers within this process are serialized; other processes writing
/// the same resource are detected through version conflicts instead.
#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shared by every critical interaction in this process
    pub fn global() -> Arc<LockTable> {
        static GLOBAL: OnceLock<Arc<LockTable>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LockTable::new())))
    }

    /// Wait for exclusive access to `key`
    ///
    /// The returned guard releases the lock when dropped, on every exit path.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of resources that have ever been locked
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
