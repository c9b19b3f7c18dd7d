use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cloud::CloudObjectStore;
use crate::error::StoreResult;
use crate::lease::{LeaseConfig, LeaseGuard, LeaseManager};
use crate::local::LocalObjectStore;
use crate::traits::ObjectStore;

/// An object store together with the lease manager that locks on it.
///
/// Cheap to clone; every clone shares the same store.
#[derive(Clone, Debug)]
pub struct Backend {
    store: Arc<dyn ObjectStore>,
    leases: LeaseManager,
}

impl Backend {
    /// Pair an arbitrary store with a lease manager.
    pub fn new(store: Arc<dyn ObjectStore>, config: LeaseConfig) -> Self {
        let leases = LeaseManager::new(Arc::clone(&store), config);
        Self { store, leases }
    }

    /// A backend on the local filesystem rooted at `root`.
    pub async fn local(root: impl Into<PathBuf>, config: LeaseConfig) -> StoreResult<Self> {
        let store = LocalObjectStore::open(root).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    /// A backend on any `object_store` bucket.
    pub fn cloud(inner: Arc<dyn object_store::ObjectStore>, config: LeaseConfig) -> Self {
        Self::new(Arc::new(CloudObjectStore::new(inner)), config)
    }

    /// A cloud-semantics backend held in process memory.
    pub fn in_memory(config: LeaseConfig) -> Self {
        Self::new(Arc::new(CloudObjectStore::in_memory()), config)
    }

    /// A backend on a Google Cloud Storage bucket.
    #[cfg(feature = "gcp")]
    pub fn gcs(bucket: &str, config: LeaseConfig) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(CloudObjectStore::gcs(bucket)?), config))
    }

    /// The underlying object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The lease manager for this store.
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Acquire the lease for `key` with an explicit ttl.
    pub async fn acquire_lease(&self, key: &str, ttl: Duration) -> StoreResult<LeaseGuard> {
        self.leases.acquire(key, ttl).await
    }

    /// Acquire the lease for `key` with the configured default ttl.
    pub async fn acquire_default_lease(&self, key: &str) -> StoreResult<LeaseGuard> {
        self.leases.acquire_default(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::WriteMode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_backend_shares_store_with_leases() {
        let dir = TempDir::new().unwrap();
        let backend = Backend::local(dir.path(), LeaseConfig::default())
            .await
            .unwrap();
        assert_eq!(backend.store().backend_name(), "local");

        let guard = backend.acquire_default_lease("k").await.unwrap();
        let leases = backend.store().list("__LEASES__").await.unwrap();
        assert_eq!(leases, vec!["k.lease"]);
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_backend() {
        let backend = Backend::in_memory(LeaseConfig::default());
        assert_eq!(backend.store().backend_name(), "cloud");
        backend
            .store()
            .write("a/b", b"x", WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(backend.store().read("a/b").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn clones_share_state() {
        let backend = Backend::in_memory(LeaseConfig::default());
        let clone = backend.clone();
        backend.store().create("k", b"v").await.unwrap();
        assert!(clone.store().exists("k").await.unwrap());
    }
}
