//! Write/read barrier protocol.
//!
//! Writers serialize per namespace on the lease `<db>/<ns>__write`, and
//! publish an operation id in the registry for the whole time their batch is
//! being written. Readers wait until the registry shows no pending
//! operations anywhere in the database before they scan.
//!
//! Registry edits are short and run under the database meta lease, so writers
//! in different namespaces only contend while adding or removing their ids.
//!
//! A process that dies mid-batch leaves its id behind; readers then block
//! until [`NamespaceCoordinator::clear_pending_operations`] is run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fakedb_registry::{
    validate_namespace_name, MetadataRegistry, NamespaceDescriptor, RegistryError,
};
use fakedb_store::path::join;
use fakedb_store::{Backend, LeaseGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::record::{record_identity, write_record, Record};
use crate::scan::scan_dir;

/// How readers wait for pending operations to clear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarrierPolicy {
    /// Delay between registry polls.
    pub poll_interval_ms: u64,
    /// Give up with a barrier timeout after this long. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,
}

impl Default for BarrierPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            max_wait_ms: None,
        }
    }
}

impl BarrierPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

/// Outcome of [`NamespaceCoordinator::register_namespace`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The namespace was registered by this call.
    Created,
    /// The namespace was already registered with this descriptor.
    Existing(NamespaceDescriptor),
}

/// Coordinates inserts and scans for one database.
///
/// Clones share the registry handle and the in-process completion signal, so
/// a reader waiting on one clone is woken as soon as a writer on another
/// clone finishes. Across processes the poll interval is the only signal.
#[derive(Clone, Debug)]
pub struct NamespaceCoordinator {
    backend: Backend,
    registry: Arc<MetadataRegistry>,
    policy: BarrierPolicy,
    settled: Arc<Notify>,
}

impl NamespaceCoordinator {
    /// Coordinator for database `db_name` on `backend`.
    pub fn new(backend: Backend, db_name: &str, policy: BarrierPolicy) -> CoreResult<Self> {
        let registry = MetadataRegistry::new(backend.clone(), db_name)?;
        Ok(Self {
            backend,
            registry: Arc::new(registry),
            policy,
            settled: Arc::new(Notify::new()),
        })
    }

    pub fn db_name(&self) -> &str {
        self.registry.db_name()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &BarrierPolicy {
        &self.policy
    }

    /// Storage directory of a namespace.
    pub fn namespace_dir(&self, namespace: &str) -> String {
        join(self.db_name(), namespace)
    }

    /// Lease key serializing writers to a namespace.
    pub fn write_lease_key(&self, namespace: &str) -> String {
        format!("{}/{namespace}__write", self.db_name())
    }

    /// Register `namespace` with `descriptor` unless it already exists.
    ///
    /// The directory is created before the descriptor is saved, so a
    /// registered namespace always has storage.
    pub async fn register_namespace(
        &self,
        namespace: &str,
        descriptor: NamespaceDescriptor,
    ) -> CoreResult<Registration> {
        validate_namespace_name(namespace)?;

        let cached = self.registry.load().await?;
        if let Some(existing) = cached.namespace(namespace) {
            return Ok(Registration::Existing(existing.clone()));
        }

        let lease = self
            .backend
            .acquire_default_lease(&self.registry.meta_lease_key())
            .await?;
        let result = self.register_locked(&lease, namespace, descriptor).await;
        lease.release().await?;
        result
    }

    async fn register_locked(
        &self,
        lease: &LeaseGuard,
        namespace: &str,
        descriptor: NamespaceDescriptor,
    ) -> CoreResult<Registration> {
        let fresh = self.registry.reload().await?;
        if let Some(existing) = fresh.namespace(namespace) {
            return Ok(Registration::Existing(existing.clone()));
        }
        self.backend
            .store()
            .make_container(&self.namespace_dir(namespace))
            .await?;
        self.registry
            .update(lease, |meta| {
                meta.namespaces.insert(namespace.to_string(), descriptor);
                Ok(())
            })
            .await?;
        info!(db = %self.db_name(), namespace, "namespace registered");
        Ok(Registration::Created)
    }

    /// Replace the descriptor of a registered namespace.
    ///
    /// `f` receives the current descriptor and returns the new one; an error
    /// from `f` leaves the registry untouched.
    pub async fn update_namespace<F>(&self, namespace: &str, f: F) -> CoreResult<NamespaceDescriptor>
    where
        F: FnOnce(&NamespaceDescriptor) -> CoreResult<NamespaceDescriptor> + Send,
    {
        let db = self.db_name().to_string();
        let mut outcome: Option<CoreResult<NamespaceDescriptor>> = None;
        self.registry
            .update_locked(|meta| {
                let Some(current) = meta.namespaces.get_mut(namespace) else {
                    return Err(RegistryError::NotFound {
                        db,
                        namespace: namespace.to_string(),
                    });
                };
                let next = f(current);
                if let Ok(descriptor) = &next {
                    *current = descriptor.clone();
                }
                outcome = Some(next);
                Ok(())
            })
            .await?;
        outcome.unwrap_or_else(|| {
            Err(CoreError::NotFound {
                db: self.db_name().to_string(),
                namespace: namespace.to_string(),
            })
        })
    }

    /// The descriptor of a registered namespace, or `NotFound`.
    pub async fn descriptor(&self, namespace: &str) -> CoreResult<NamespaceDescriptor> {
        let meta = self.registry.require_namespace(namespace).await?;
        meta.namespace(namespace).cloned().ok_or_else(|| CoreError::NotFound {
            db: self.db_name().to_string(),
            namespace: namespace.to_string(),
        })
    }

    /// The descriptor of a registered namespace as storage holds it now,
    /// bypassing this handle's cache. Use it where another handle may have
    /// rebound the namespace.
    pub async fn current_descriptor(&self, namespace: &str) -> CoreResult<NamespaceDescriptor> {
        let meta = self.registry.reload().await?;
        meta.namespace(namespace).cloned().ok_or_else(|| CoreError::NotFound {
            db: self.db_name().to_string(),
            namespace: namespace.to_string(),
        })
    }

    /// All registered namespaces, freshly read.
    pub async fn namespaces(&self) -> CoreResult<BTreeMap<String, NamespaceDescriptor>> {
        Ok(self.registry.reload().await?.namespaces)
    }

    /// Write `records` into `namespace` as one batch.
    ///
    /// Each record's identity is taken from `identity_field` (a fresh UUID if
    /// the field is missing or null). Returns the object names written, in
    /// order. An empty batch returns immediately without touching the
    /// registry or any lease.
    ///
    /// The operation id is removed from the registry even if a record write
    /// fails; records written before the failure stay visible and the write
    /// error is returned.
    pub async fn insert_batch(
        &self,
        namespace: &str,
        records: &[Record],
        identity_field: &str,
    ) -> CoreResult<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.registry.require_namespace(namespace).await?;

        let lease = self
            .backend
            .acquire_default_lease(&self.write_lease_key(namespace))
            .await?;
        let result = self.write_batch(namespace, records, identity_field).await;
        let released = lease.release().await;
        let names = result?;
        released?;
        Ok(names)
    }

    async fn write_batch(
        &self,
        namespace: &str,
        records: &[Record],
        identity_field: &str,
    ) -> CoreResult<Vec<String>> {
        let op_id = Uuid::new_v4().to_string();
        let mut pending = PendingOperation {
            registry: Arc::clone(&self.registry),
            settled: Arc::clone(&self.settled),
            op_id: op_id.clone(),
            armed: true,
        };
        self.registry
            .update_locked(|meta| {
                meta.operations.insert(op_id.clone());
                Ok(())
            })
            .await?;
        debug!(db = %self.db_name(), namespace, op = %op_id, count = records.len(), "batch started");

        let dir = self.namespace_dir(namespace);
        let store = self.backend.store();
        let mut names = Vec::with_capacity(records.len());
        let mut write_error = None;
        for record in records {
            let identity = record_identity(record, identity_field);
            match write_record(&**store, &dir, record, &identity, &op_id).await {
                Ok(name) => names.push(name),
                Err(e) => {
                    warn!(
                        db = %self.db_name(),
                        namespace,
                        op = %op_id,
                        written = names.len(),
                        error = %e,
                        "batch write failed"
                    );
                    write_error = Some(e);
                    break;
                }
            }
        }

        let finished = self
            .registry
            .update_locked(|meta| {
                meta.operations.remove(&op_id);
                Ok(())
            })
            .await;
        if finished.is_ok() {
            pending.armed = false;
        }
        self.settled.notify_waiters();
        debug!(db = %self.db_name(), namespace, op = %op_id, written = names.len(), "batch finished");

        if let Some(e) = write_error {
            return Err(e);
        }
        finished?;
        Ok(names)
    }

    /// Block until no operation is pending anywhere in the database.
    pub async fn wait_for_quiescence(&self) -> CoreResult<()> {
        let started = Instant::now();
        let mut logged = false;
        loop {
            // Register for the wakeup before reading, so a writer finishing
            // between the read and the wait is not missed.
            let notified = self.settled.notified();
            let meta = self.registry.reload().await?;
            if !meta.has_pending_operations() {
                if logged {
                    debug!(db = %self.db_name(), waited = ?started.elapsed(), "barrier cleared");
                }
                return Ok(());
            }
            if !logged {
                debug!(
                    db = %self.db_name(),
                    pending = meta.operations.len(),
                    "waiting for pending operations"
                );
                logged = true;
            }

            let mut pause = self.policy.poll_interval();
            if let Some(max_wait) = self.policy.max_wait() {
                let waited = started.elapsed();
                if waited >= max_wait {
                    return Err(CoreError::BarrierTimeout {
                        db: self.db_name().to_string(),
                        waited,
                    });
                }
                pause = pause.min(max_wait - waited);
            }
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = notified => {}
            }
        }
    }

    /// Scan `namespace` once no operation is pending, keeping records that
    /// satisfy `filter`.
    pub async fn scan<F>(&self, namespace: &str, filter: F) -> CoreResult<Vec<Record>>
    where
        F: Fn(&Record) -> bool + Send + Sync,
    {
        self.registry.require_namespace(namespace).await?;
        self.wait_for_quiescence().await?;
        let dir = self.namespace_dir(namespace);
        scan_dir(&**self.backend.store(), &dir, filter).await
    }

    /// Ids of operations currently recorded as pending.
    pub async fn pending_operations(&self) -> CoreResult<BTreeSet<String>> {
        Ok(self.registry.reload().await?.operations)
    }

    /// Drop every pending operation id, returning the ids removed.
    ///
    /// Only safe when no writer is actually running; use it to recover from
    /// a writer that crashed mid-batch.
    pub async fn clear_pending_operations(&self) -> CoreResult<BTreeSet<String>> {
        let cleared = self
            .registry
            .update_locked(|meta| Ok(std::mem::take(&mut meta.operations)))
            .await?;
        if !cleared.is_empty() {
            warn!(db = %self.db_name(), count = cleared.len(), "cleared pending operations");
            self.settled.notify_waiters();
        }
        Ok(cleared)
    }
}

/// An operation id published in the registry by a running batch.
///
/// If the batch is dropped before it removes the id itself (cancellation,
/// timeout, or a failed removal), dropping the guard removes it in a
/// background task on the current tokio runtime. Outside a runtime the id
/// stays until [`NamespaceCoordinator::clear_pending_operations`] runs.
struct PendingOperation {
    registry: Arc<MetadataRegistry>,
    settled: Arc<Notify>,
    op_id: String,
    armed: bool,
}

impl Drop for PendingOperation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let settled = Arc::clone(&self.settled);
        let op_id = std::mem::take(&mut self.op_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let removed = registry
                        .update_locked(|meta| {
                            meta.operations.remove(&op_id);
                            Ok(())
                        })
                        .await;
                    match removed {
                        Ok(()) => debug!(db = %registry.db_name(), op = %op_id, "abandoned operation cleared"),
                        Err(e) => warn!(
                            db = %registry.db_name(),
                            op = %op_id,
                            error = %e,
                            "failed to clear abandoned operation"
                        ),
                    }
                    settled.notify_waiters();
                });
            }
            Err(_) => warn!(op = %op_id, "no runtime to clear abandoned operation"),
        }
    }
}
