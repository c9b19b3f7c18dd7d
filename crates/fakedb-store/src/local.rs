use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::path::{validate_path, validate_prefix};
use crate::traits::{ObjectStore, WriteMode};

/// Filesystem-backed object store rooted at a directory.
///
/// Every write is staged to a hidden sibling file first (`.name.<uuid>.tmp`)
/// so readers never see partial content:
///
/// - [`WriteMode::Overwrite`] renames the staged file over the target.
/// - [`WriteMode::CreateIfAbsent`] hard-links the staged file to the target,
///   which the OS refuses atomically when the target already exists.
///
/// Names starting with `.` are reserved for staging and never listed.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "opened local object store");
        Ok(Self { root })
    }

    /// The directory this store is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }

    fn resolve_prefix(&self, path: &str) -> StoreResult<PathBuf> {
        validate_prefix(path)?;
        Ok(if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        })
    }

    fn staging_path(target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staged = format!(".{name}.{}.tmp", Uuid::new_v4().simple());
        target.with_file_name(staged)
    }

    async fn discard_staged(staged: &Path) {
        if let Err(e) = fs::remove_file(staged).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %staged.display(), error = %e, "failed to remove staged file");
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => {
                // A container is not an object, as on the cloud backend.
                let is_dir = fs::metadata(&full).await.is_ok_and(|m| m.is_dir());
                if is_dir {
                    Err(StoreError::NotFound(path.to_string()))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn write(&self, path: &str, data: &[u8], mode: WriteMode) -> StoreResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staged = Self::staging_path(&target);
        fs::write(&staged, data).await?;

        match mode {
            WriteMode::Overwrite => {
                if let Err(e) = fs::rename(&staged, &target).await {
                    Self::discard_staged(&staged).await;
                    return Err(e.into());
                }
                Ok(())
            }
            WriteMode::CreateIfAbsent => {
                let linked = fs::hard_link(&staged, &target).await;
                Self::discard_staged(&staged).await;
                match linked {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        Err(StoreError::AlreadyExists(path.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let full = self.resolve(path)?;
        Ok(fs::try_exists(&full).await?)
    }

    async fn list(&self, path: &str) -> StoreResult<Vec<String>> {
        let dir = self.resolve_prefix(path)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn make_container(&self, path: &str) -> StoreResult<()> {
        let dir = self.resolve(path)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }
}
