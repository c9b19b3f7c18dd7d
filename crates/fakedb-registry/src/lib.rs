//! Metadata registry for FakeDB databases.
//!
//! Every database keeps a single JSON document at `<db>/__METADATA__` that
//! records which namespaces (collections and tables) exist and which insert
//! batches are in flight. Readers use the in-flight set as a barrier; the
//! namespace map is the authority on whether insert and query are allowed.
//!
//! # Architecture
//!
//! - The document is created lazily on first load, with a create-if-absent
//!   write so concurrent initializers agree on one copy.
//! - An unparsable document resets to empty and is rewritten on the next save.
//! - Saves replace the whole document atomically.
//! - Mutations are reload-modify-save under the database's meta lease.
//!
//! # Modules
//!
//! - [`error`]: Error types for registry operations
//! - [`types`]: The document: [`Metadata`], [`NamespaceDescriptor`]
//! - [`names`]: Database/namespace name validation
//! - [`registry`]: The per-handle [`MetadataRegistry`]

pub mod error;
pub mod names;
pub mod registry;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use names::{validate_database_name, validate_namespace_name};
pub use registry::{MetadataRegistry, METADATA_OBJECT};
pub use types::{FieldMapping, Metadata, NamespaceDescriptor};
