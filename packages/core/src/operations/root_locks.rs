//! Per-root exclusive sections
//!
//! Edge-chain rewrites are not commutative, so structural operations on one
//! document run one at a time. Different documents never contend.
//!
//! An entry lives only while some caller holds or waits for it; the last
//! guard to drop removes it, so deleted documents and failed creates leave
//! nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Default)]
pub(crate) struct RootLocks {
    locks: LockMap,
}

impl RootLocks {
    /// Wait for exclusive access to `root_id`; released when the guard drops
    pub(crate) async fn acquire(&self, root_id: &str) -> RootGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(root_id.to_string()).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;
        RootGuard {
            guard: Some(guard),
            lock,
            root_id: root_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Roots with a live entry
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

/// Exclusive access to one document root
///
/// Owned, so it can move into the task that commits the operation.
#[derive(Debug)]
pub(crate) struct RootGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<AsyncMutex<()>>,
    root_id: String,
    locks: LockMap,
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // The map and this guard are the only owners: nobody holds or waits
        if Arc::strong_count(&self.lock) == 2 {
            if let Some(entry) = locks.get(&self.root_id) {
                if Arc::ptr_eq(entry, &self.lock) {
                    locks.remove(&self.root_id);
                }
            }
        }
    }
}
