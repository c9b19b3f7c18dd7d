//! High-level SDK for FakeDB.
//!
//! Two façades share one storage engine: [`DocumentDb`] stores free-form
//! JSON documents in collections, [`TableDb`] stores rows with a declared
//! column set and understands a small SQL subset. Both open a database on a
//! [`Backend`], usually built from a [`FakeDbConfig`].

mod bindings;
pub mod config;
pub mod document;
pub mod error;
pub mod table;

pub use config::{FakeDbConfig, StorageConfig};
pub use document::{Collection, DocumentDb, ID_FIELD};
pub use error::{SdkError, SdkResult};
pub use table::{SqlOutcome, TableDb, ID_COLUMN};

// Re-export key types
pub use fakedb_core::{
    BarrierPolicy, FieldMapping, NamespaceDescriptor, Record, RecordInput, RecordModel,
};
pub use fakedb_store::{Backend, ErrorKind, LeaseConfig};
