use std::sync::Arc;

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{PutMode, PutOptions, PutPayload};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::path::{join, validate_path, validate_prefix};
use crate::traits::{ObjectStore, WriteMode};

/// Object store backed by a cloud bucket through the `object_store` crate.
///
/// Create-if-absent writes use [`PutMode::Create`], which the bucket enforces
/// natively (on GCS this is an `ifGenerationMatch=0` precondition). Plain
/// writes are single PUTs, so replacement is atomic. Buckets have no real
/// directories: [`ObjectStore::make_container`] is a no-op and a container
/// "exists" as soon as an object is written under it.
#[derive(Clone)]
pub struct CloudObjectStore {
    inner: Arc<dyn object_store::ObjectStore>,
    prefix: String,
}

impl CloudObjectStore {
    /// Wrap any `object_store` implementation.
    pub fn new(inner: Arc<dyn object_store::ObjectStore>) -> Self {
        Self {
            inner,
            prefix: String::new(),
        }
    }

    /// A bucket emulated in process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// A Google Cloud Storage bucket, configured from the `GOOGLE_*`
    /// environment variables.
    #[cfg(feature = "gcp")]
    pub fn gcs(bucket: &str) -> StoreResult<Self> {
        let gcs = object_store::gcp::GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self::new(Arc::new(gcs)))
    }

    /// Scope every path under `prefix` inside the bucket.
    pub fn with_prefix(mut self, prefix: &str) -> StoreResult<Self> {
        validate_prefix(prefix)?;
        self.prefix = prefix.to_string();
        Ok(self)
    }

    fn location(&self, path: &str) -> StoreResult<ObjectPath> {
        let full = join(&self.prefix, path);
        ObjectPath::parse(&full).map_err(|e| StoreError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn object(&self, path: &str) -> StoreResult<ObjectPath> {
        validate_path(path)?;
        self.location(path)
    }
}

impl std::fmt::Debug for CloudObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudObjectStore")
            .field("bucket", &self.inner.to_string())
            .field("prefix", &self.prefix)
            .finish()
    }
}

fn map_err(path: &str, err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound(path.to_string()),
        object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
            StoreError::AlreadyExists(path.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for CloudObjectStore {
    fn backend_name(&self) -> &'static str {
        "cloud"
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let location = self.object(path)?;
        let result = self
            .inner
            .get(&location)
            .await
            .map_err(|e| map_err(path, e))?;
        let bytes = result.bytes().await.map_err(|e| map_err(path, e))?;
        Ok(bytes.to_vec())
    }

    async fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> StoreResult<()> {
        let location = self.object(path)?;
        let opts = match mode {
            WriteMode::Overwrite => PutOptions::default(),
            WriteMode::CreateIfAbsent => PutOptions::from(PutMode::Create),
        };
        self.inner
            .put_opts(&location, PutPayload::from(data.to_vec()), opts)
            .await
            .map_err(|e| map_err(path, e))?;
        debug!(path, ?mode, size = data.len(), "cloud put");
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let location = self.object(path)?;
        match self.inner.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_err(path, e)),
        }
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let location = self.object(path)?;
        match self.inner.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_err(path, e)),
        }
    }

    async fn list(&self, path: &str) -> StoreResult<Vec<String>> {
        validate_prefix(path)?;
        let full = join(&self.prefix, path);
        let listing = if full.is_empty() {
            self.inner.list_with_delimiter(None).await
        } else {
            let location = self.location(path)?;
            self.inner.list_with_delimiter(Some(&location)).await
        }
        .map_err(|e| map_err(path, e))?;

        let mut names: Vec<String> = listing
            .objects
            .iter()
            .filter_map(|meta| meta.location.filename().map(str::to_string))
            .chain(
                listing
                    .common_prefixes
                    .iter()
                    .filter_map(|p| p.filename().map(str::to_string)),
            )
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn make_container(&self, path: &str) -> StoreResult<()> {
        validate_path(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_crud() {
        let store = CloudObjectStore::in_memory();
        store
            .write("folder/data.txt", b"hello", WriteMode::Overwrite)
            .await
            .unwrap();
        assert!(store.exists("folder/data.txt").await.unwrap());
        assert_eq!(store.read("folder/data.txt").await.unwrap(), b"hello");
        assert_eq!(store.list("folder").await.unwrap(), vec!["data.txt"]);

        store.delete("folder/data.txt").await.unwrap();
        assert!(!store.exists("folder/data.txt").await.unwrap());
    }

    #[tokio::test]
    async fn generation_precondition_rejects_second_create() {
        let store = CloudObjectStore::in_memory();
        store.create("lease", b"first").await.unwrap();
        let err = store.create("lease", b"second").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.read("lease").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn missing_object_semantics() {
        let store = CloudObjectStore::in_memory();
        assert!(matches!(
            store.read("missing").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        store.delete("missing").await.unwrap();
        assert!(store.list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_returns_immediate_children() {
        let store = CloudObjectStore::in_memory();
        for path in ["db/__METADATA__", "db/users/r1", "db/users/r2", "db/docs/d1"] {
            store.write(path, b"{}", WriteMode::Overwrite).await.unwrap();
        }
        assert_eq!(
            store.list("db").await.unwrap(),
            vec!["__METADATA__", "docs", "users"]
        );
        assert_eq!(store.list("db/users").await.unwrap(), vec!["r1", "r2"]);
        assert_eq!(store.list("").await.unwrap(), vec!["db"]);
    }

    #[tokio::test]
    async fn prefix_scopes_paths() {
        let inner: Arc<dyn object_store::ObjectStore> =
            Arc::new(object_store::memory::InMemory::new());
        let tenant_a = CloudObjectStore::new(Arc::clone(&inner))
            .with_prefix("tenant-a")
            .unwrap();
        let tenant_b = CloudObjectStore::new(inner).with_prefix("tenant-b").unwrap();

        tenant_a.write("k", b"a", WriteMode::Overwrite).await.unwrap();
        assert!(!tenant_b.exists("k").await.unwrap());
        assert_eq!(tenant_a.list("").await.unwrap(), vec!["k"]);
    }

    #[tokio::test]
    async fn make_container_is_noop() {
        let store = CloudObjectStore::in_memory();
        store.make_container("db/users").await.unwrap();
        assert!(store.list("db").await.unwrap().is_empty());
    }
}
