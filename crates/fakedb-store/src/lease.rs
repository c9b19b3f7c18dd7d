//! TTL leases built from create-if-absent writes.
//!
//! A lease for key `k` is the object `<lease_dir>/<escaped k>.lease` holding a
//! [`LeaseRecord`]. Whoever manages to create that object holds the lease.
//! Contenders read the existing record and either back off or, when the record
//! is stale (`now - timestamp > ttl`) or unreadable, delete it and try again.
//!
//! No owner identity is stored, so reclamation is purely time based:
//! exclusivity only holds while every holder finishes within its ttl. A
//! holder that overruns can be preempted without noticing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::path::join;
use crate::traits::{ObjectStore, WriteMode};

/// Lease timing and placement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Default lease lifetime in milliseconds.
    pub ttl_ms: u64,
    /// Back-off between attempts on a live lease, in milliseconds.
    pub retry_interval_ms: u64,
    /// Directory (relative to the store root) holding lease objects.
    pub lease_dir: String,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            retry_interval_ms: 50,
            lease_dir: "__LEASES__".into(),
        }
    }
}

impl LeaseConfig {
    /// Default lease lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Back-off between attempts on a live lease.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Contents of a lease object.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Seconds since the Unix epoch at which the lease was taken.
    pub timestamp: f64,
    /// Lease lifetime in seconds.
    pub ttl: f64,
}

impl LeaseRecord {
    /// A record stamped with the current time.
    pub fn new(ttl: Duration) -> Self {
        Self {
            timestamp: now_secs(),
            ttl: ttl.as_secs_f64(),
        }
    }

    /// Seconds elapsed since the lease was taken, as of `now`.
    pub fn age_at(&self, now: f64) -> f64 {
        now - self.timestamp
    }

    /// Whether the lease has outlived its ttl as of `now`.
    pub fn is_stale_at(&self, now: f64) -> bool {
        self.age_at(now) > self.ttl
    }
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Map a lease key onto a single flat object name.
///
/// `%` and `/` are percent-escaped so distinct keys never collide and keys
/// like `db/users__write` stay one path component.
pub fn lease_object_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 6);
    for ch in key.chars() {
        match ch {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            _ => name.push(ch),
        }
    }
    name.push_str(".lease");
    name
}

/// Acquires and inspects leases on one object store.
#[derive(Clone, Debug)]
pub struct LeaseManager {
    store: Arc<dyn ObjectStore>,
    config: LeaseConfig,
}

impl LeaseManager {
    /// Create a lease manager over `store`.
    pub fn new(store: Arc<dyn ObjectStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Object path of the lease for `key`.
    pub fn lease_path(&self, key: &str) -> String {
        join(&self.config.lease_dir, &lease_object_name(key))
    }

    /// Acquire the lease for `key`, waiting as long as it takes.
    ///
    /// There is no built-in deadline: a lease that is continually renewed by
    /// other parties blocks forever. Wrap the call in
    /// [`Self::acquire_within`] or `tokio::time::timeout` to bound it.
    /// Cancelling the returned future never leaves the lease held by the
    /// canceller beyond its ttl.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> StoreResult<LeaseGuard> {
        let path = self.lease_path(key);
        let started = Instant::now();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            let record = LeaseRecord::new(ttl);
            let body = serde_json::to_vec(&record)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            match self.store.write(&path, &body, WriteMode::CreateIfAbsent).await {
                Ok(()) => {
                    debug!(key, attempts, waited = ?started.elapsed(), "lease acquired");
                    return Ok(LeaseGuard {
                        store: Arc::clone(&self.store),
                        key: key.to_string(),
                        path,
                        acquired_at: Instant::now(),
                        released: false,
                    });
                }
                Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }

            let existing = match self.store.read_if_exists(&path).await? {
                // Released between our create and our read.
                None => continue,
                Some(bytes) => serde_json::from_slice::<LeaseRecord>(&bytes),
            };

            match existing {
                Ok(holder) if !holder.is_stale_at(now_secs()) => {
                    tokio::time::sleep(self.config.retry_interval()).await;
                }
                Ok(holder) => {
                    warn!(
                        key,
                        age_secs = holder.age_at(now_secs()),
                        ttl_secs = holder.ttl,
                        "reclaiming stale lease"
                    );
                    self.store.delete(&path).await?;
                }
                Err(e) => {
                    warn!(key, error = %e, "reclaiming unreadable lease");
                    self.store.delete(&path).await?;
                }
            }
        }
    }

    /// Acquire with the configured default ttl.
    pub async fn acquire_default(&self, key: &str) -> StoreResult<LeaseGuard> {
        self.acquire(key, self.config.ttl()).await
    }

    /// Acquire, giving up with [`StoreError::LeaseTimeout`] after `deadline`.
    pub async fn acquire_within(
        &self,
        key: &str,
        ttl: Duration,
        deadline: Duration,
    ) -> StoreResult<LeaseGuard> {
        match tokio::time::timeout(deadline, self.acquire(key, ttl)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::LeaseTimeout {
                key: key.to_string(),
                waited: deadline,
            }),
        }
    }

    /// Read the current lease record for `key`, if any.
    ///
    /// Returns `Ok(None)` when no lease object exists or it cannot be parsed.
    pub async fn inspect(&self, key: &str) -> StoreResult<Option<LeaseRecord>> {
        let path = self.lease_path(key);
        Ok(self
            .store
            .read_if_exists(&path)
            .await?
            .and_then(|bytes| serde_json::from_slice(&bytes).ok()))
    }
}

/// A held lease.
///
/// Release it with [`LeaseGuard::release`]. A guard dropped while still held
/// (early return, panic, task cancellation) deletes its lease object in a
/// background task on the current tokio runtime; outside a runtime the lease
/// simply expires after its ttl.
#[must_use = "the lease is held until the guard is released or dropped"]
pub struct LeaseGuard {
    store: Arc<dyn ObjectStore>,
    key: String,
    path: String,
    acquired_at: Instant,
    released: bool,
}

impl LeaseGuard {
    /// The lease key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Object path of the lease.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// How long the lease has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Delete the lease object.
    ///
    /// Tolerates the object already being gone (a stale-lease reclaim by
    /// another party got there first).
    pub async fn release(mut self) -> StoreResult<()> {
        let result = self.store.delete(&self.path).await;
        self.released = result.is_ok();
        if self.released {
            debug!(key = %self.key, held = ?self.held_for(), "lease released");
        }
        result
    }
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let path = std::mem::take(&mut self.path);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match store.delete(&path).await {
                        Ok(()) => debug!(key, "lease released on drop"),
                        Err(e) => warn!(key, error = %e, "failed to release dropped lease"),
                    }
                });
            }
            Err(_) => {
                warn!(key, "lease guard dropped outside a runtime; it will expire after its ttl");
            }
        }
    }
}
