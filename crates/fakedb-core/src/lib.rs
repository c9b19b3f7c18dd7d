//! Coordination layer for FakeDB.
//!
//! This crate sits between raw object storage and the database façades. It
//! provides:
//! - The namespace coordinator: per-namespace write leases, pending-operation
//!   tracking, and the database-wide read barrier
//! - The record layout: one immutable object per record, named
//!   `<timestamp>_<identity>_<opId>`
//! - Full scans that skip unparsable objects
//! - Schema normalization for tables
//! - Typed records via [`RecordModel`]

pub mod coordinator;
pub mod error;
pub mod model;
pub mod record;
pub mod scan;
pub mod schema;

pub use coordinator::{BarrierPolicy, NamespaceCoordinator, Registration};
pub use error::{CoreError, CoreResult};
pub use model::{infer_schema, ModelAdapter, ModelBinding, RecordModel};
pub use record::{Record, RecordInput};
pub use schema::normalize;

// Re-export the lower layers so façades need a single import path.
pub use fakedb_registry::{
    validate_namespace_name, FieldMapping, Metadata, NamespaceDescriptor,
};
pub use fakedb_store::{Backend, ErrorKind, LeaseConfig};
