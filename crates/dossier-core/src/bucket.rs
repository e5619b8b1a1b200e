use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use dossier_store::{ObjectStore, StoreResult};

/// Remembers that the bucket exists once the store has confirmed it.
///
/// The check runs once at startup without failing it, and again on first real
/// use until it succeeds. Concurrent first uploads wait on one check instead
/// of each hitting the store.
pub struct BucketGuard {
    store: Arc<dyn ObjectStore>,
    ready: AtomicBool,
    check: Mutex<()>,
}

impl BucketGuard {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            ready: AtomicBool::new(false),
            check: Mutex::new(()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Make sure the bucket exists, creating it if needed.
    pub async fn ensure(&self) -> StoreResult<()> {
        if self.is_ready() {
            return Ok(());
        }
        let _check = self.check.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        self.store.ensure_bucket().await?;
        self.ready.store(true, Ordering::Release);
        info!(bucket = self.store.bucket(), "bucket ready");
        Ok(())
    }

    /// Startup variant of [`ensure`](Self::ensure): logs failure and returns.
    pub async fn warm_up(&self) {
        if let Err(e) = self.ensure().await {
            warn!(
                bucket = self.store.bucket(),
                error = %e,
                "bucket check failed at startup; retrying on first upload"
            );
        }
    }
}

impl std::fmt::Debug for BucketGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketGuard")
            .field("bucket", &self.store.bucket())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_store::{Fault, InMemoryObjectStore};

    #[tokio::test]
    async fn warm_up_survives_an_unreachable_store() {
        let store = Arc::new(InMemoryObjectStore::new("docs"));
        store.set_fault(Some(Fault::Unreachable));
        let guard = BucketGuard::new(store.clone());

        guard.warm_up().await;
        assert!(!guard.is_ready());

        store.set_fault(None);
        guard.ensure().await.unwrap();
        assert!(guard.is_ready());
        assert!(store.bucket_exists());
    }

    #[tokio::test]
    async fn confirmed_bucket_is_not_checked_again() {
        let store = Arc::new(InMemoryObjectStore::new("docs"));
        let guard = BucketGuard::new(store.clone());
        guard.ensure().await.unwrap();
        guard.ensure().await.unwrap();
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_uses_check_once() {
        let store = Arc::new(InMemoryObjectStore::new("docs"));
        store.set_latency(std::time::Duration::from_millis(20));
        let guard = Arc::new(BucketGuard::new(store.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.ensure().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.call_count(), 1);
    }
}
