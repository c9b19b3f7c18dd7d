//! Object storage capability for FakeDB.
//!
//! FakeDB keeps every piece of state, including its locks, as individual
//! objects in a blob store. This crate defines the storage contract the rest
//! of the system is written against and the backends that fulfil it.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`LocalObjectStore`] -- a directory on the local filesystem
//! - [`CloudObjectStore`] -- any `object_store` bucket (GCS with the `gcp`
//!   feature, or the in-memory bucket used in tests)
//!
//! # Leases
//!
//! [`LeaseManager`] builds a TTL lock out of nothing but create-if-absent,
//! read and delete. [`Backend`] bundles a store with its lease manager.
//!
//! # Design Rules
//!
//! 1. Readers never see partially written objects.
//! 2. Create-if-absent is atomic across processes on every backend.
//! 3. Deleting a missing object and listing a missing path are not errors.
//! 4. No coordination state lives in memory; everything is an object.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod backend;
pub mod cloud;
pub mod error;
pub mod lease;
pub mod local;
pub mod path;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::Backend;
pub use cloud::CloudObjectStore;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use lease::{LeaseConfig, LeaseGuard, LeaseManager, LeaseRecord};
pub use local::LocalObjectStore;
pub use traits::{ObjectStore, WriteMode};
