use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};

/// How a write treats an existing object at the target path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Replace any existing object atomically.
    #[default]
    Overwrite,
    /// Fail with [`StoreError::AlreadyExists`] if the object exists. The check
    /// and the write are a single atomic step on every backend.
    CreateIfAbsent,
}

/// Byte-addressed object storage.
///
/// All implementations must satisfy these invariants:
/// - A reader never observes a partially written object.
/// - `CreateIfAbsent` writes are atomic with respect to concurrent writers in
///   any process sharing the same storage location.
/// - `delete` of a missing object succeeds.
/// - `list` of a missing path returns an empty listing.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Short name of the backend, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Read the full contents of an object.
    ///
    /// Returns [`StoreError::NotFound`] if the object does not exist.
    async fn read(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Write an object.
    async fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> StoreResult<()>;

    /// Delete an object. Deleting a missing object is a no-op.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Names of the immediate children of `path`, sorted and de-duplicated.
    ///
    /// Pass `""` to list the store root.
    async fn list(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Create a container (directory) at `path`. Idempotent.
    async fn make_container(&self, path: &str) -> StoreResult<()>;

    /// Create an object only if nothing exists at `path`.
    async fn create(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        self.write(path, data, WriteMode::CreateIfAbsent).await
    }

    /// Read an object, mapping a missing object to `Ok(None)`.
    async fn read_if_exists(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
