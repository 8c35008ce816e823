//! Per-storage write serialization.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async mutex per storage.
///
/// Mutations of a storage hold its guard for their whole duration, so
/// quota checks and size updates never interleave. Reads never lock.
#[derive(Debug, Default)]
pub struct StorageLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StorageLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to a storage.
    pub async fn acquire(&self, storage_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(storage_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock of a deleted storage.
    pub async fn forget(&self, storage_id: &str) {
        self.locks.lock().await.remove(storage_id);
    }

    /// Number of storages with a registered lock.
    pub async fn registered(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_storage_is_exclusive() {
        let locks = Arc::new(StorageLocks::new());
        let guard = locks.acquire("s1").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("s1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_storages_do_not_block() {
        let locks = StorageLocks::new();
        let _a = locks.acquire("s1").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("s2"))
            .await
            .unwrap();
        assert_eq!(locks.registered().await, 2);
    }

    #[tokio::test]
    async fn test_forget() {
        let locks = StorageLocks::new();
        drop(locks.acquire("s1").await);
        locks.forget("s1").await;
        assert_eq!(locks.registered().await, 0);
    }
}
