//! The per-database registry handle.
//!
//! [`MetadataRegistry`] caches the registry document per handle. The cache is
//! optimistic: it is only good for read-mostly checks. Every mutation goes
//! through [`MetadataRegistry::update`], which re-reads the document while the
//! caller holds the database's meta lease, so two handles can never save
//! stale copies over each other.

use fakedb_store::path::join;
use fakedb_store::{Backend, LeaseGuard, StoreError, WriteMode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::names::validate_database_name;
use crate::types::Metadata;

/// Object name of the registry document inside a database directory.
pub const METADATA_OBJECT: &str = "__METADATA__";

#[derive(Debug, Default)]
struct CacheState {
    metadata: Option<Metadata>,
    /// The stored document was unreadable and has been reset in memory; the
    /// next save must persist even if nothing else changed.
    reset_pending: bool,
}

/// Handle on one database's registry document.
#[derive(Debug)]
pub struct MetadataRegistry {
    backend: Backend,
    db_name: String,
    path: String,
    cache: Mutex<CacheState>,
}

impl MetadataRegistry {
    /// Create a handle for database `db_name`. Nothing is read until the
    /// first [`Self::load`].
    pub fn new(backend: Backend, db_name: &str) -> RegistryResult<Self> {
        validate_database_name(db_name)?;
        Ok(Self {
            path: join(db_name, METADATA_OBJECT),
            backend,
            db_name: db_name.to_string(),
            cache: Mutex::new(CacheState::default()),
        })
    }

    /// The database name.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Object path of the registry document.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The backend this registry lives on.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Lease key guarding registry mutations for this database.
    pub fn meta_lease_key(&self) -> String {
        format!("{}__meta", self.db_name)
    }

    /// Return the cached document, reading it on first use.
    pub async fn load(&self) -> RegistryResult<Metadata> {
        let mut cache = self.cache.lock().await;
        if let Some(meta) = &cache.metadata {
            return Ok(meta.clone());
        }
        self.read_into(&mut cache).await
    }

    /// Re-read the document from storage, replacing the cache.
    pub async fn reload(&self) -> RegistryResult<Metadata> {
        let mut cache = self.cache.lock().await;
        self.read_into(&mut cache).await
    }

    async fn read_into(&self, cache: &mut CacheState) -> RegistryResult<Metadata> {
        let store = self.backend.store();
        let meta = loop {
            match store.read_if_exists(&self.path).await? {
                Some(bytes) => match serde_json::from_slice::<Metadata>(&bytes) {
                    Ok(meta) => {
                        cache.reset_pending = false;
                        break meta;
                    }
                    Err(e) => {
                        warn!(
                            db = %self.db_name,
                            error = %e,
                            "registry document unreadable; resetting to empty"
                        );
                        cache.reset_pending = true;
                        break Metadata::default();
                    }
                },
                None => {
                    let empty = Metadata::default();
                    store.make_container(&self.db_name).await?;
                    match store.create(&self.path, &encode(&empty)?).await {
                        Ok(()) => {
                            info!(db = %self.db_name, "initialized registry");
                            cache.reset_pending = false;
                            break empty;
                        }
                        // Another handle initialized it first; read theirs.
                        Err(StoreError::AlreadyExists(_)) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        };
        cache.metadata = Some(meta.clone());
        Ok(meta)
    }

    /// Persist `meta` as the full registry document and cache it.
    ///
    /// The write is an atomic replace on every backend. Callers must hold
    /// the meta lease and have reloaded immediately before mutating; prefer
    /// [`Self::update`], which enforces that order.
    pub async fn save(&self, meta: &Metadata) -> RegistryResult<()> {
        let mut cache = self.cache.lock().await;
        self.backend
            .store()
            .write(&self.path, &encode(meta)?, WriteMode::Overwrite)
            .await?;
        cache.metadata = Some(meta.clone());
        cache.reset_pending = false;
        debug!(
            db = %self.db_name,
            namespaces = meta.namespaces.len(),
            operations = meta.operations.len(),
            "registry saved"
        );
        Ok(())
    }

    /// Reload, apply `f`, and save if anything changed.
    ///
    /// `lease` must be the meta lease for this database (see
    /// [`Self::meta_lease_key`]); it is taken by reference as proof that the
    /// caller holds it for the whole read-modify-write.
    pub async fn update<T, F>(&self, lease: &LeaseGuard, f: F) -> RegistryResult<T>
    where
        F: FnOnce(&mut Metadata) -> RegistryResult<T>,
    {
        debug_assert_eq!(lease.key(), self.meta_lease_key());
        let mut meta = self.reload().await?;
        let before = meta.clone();
        let value = f(&mut meta)?;
        let reset_pending = self.cache.lock().await.reset_pending;
        if meta != before || reset_pending {
            self.save(&meta).await?;
        }
        Ok(value)
    }

    /// Acquire the meta lease, run [`Self::update`], and release the lease on
    /// every path.
    pub async fn update_locked<T, F>(&self, f: F) -> RegistryResult<T>
    where
        F: FnOnce(&mut Metadata) -> RegistryResult<T>,
    {
        let lease = self
            .backend
            .acquire_default_lease(&self.meta_lease_key())
            .await?;
        let result = self.update(&lease, f).await;
        let released = lease.release().await;
        let value = result?;
        released?;
        Ok(value)
    }

    /// Fail with [`RegistryError::NotFound`] unless `namespace` is registered,
    /// consulting storage if the cached copy does not know it.
    pub async fn require_namespace(&self, namespace: &str) -> RegistryResult<Metadata> {
        let cached = self.load().await?;
        if cached.has_namespace(namespace) {
            return Ok(cached);
        }
        let fresh = self.reload().await?;
        if fresh.has_namespace(namespace) {
            Ok(fresh)
        } else {
            Err(RegistryError::NotFound {
                db: self.db_name.clone(),
                namespace: namespace.to_string(),
            })
        }
    }
}

fn encode(meta: &Metadata) -> RegistryResult<Vec<u8>> {
    serde_json::to_vec(meta).map_err(|e| RegistryError::Serialization(e.to_string()))
}
