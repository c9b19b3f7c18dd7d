//! Error types for registry operations.

use fakedb_store::{ErrorKind, StoreError};
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The namespace is not registered in the database.
    #[error("namespace not found: {db}/{namespace}")]
    NotFound { db: String, namespace: String },

    /// A namespace with this name is already registered.
    #[error("namespace already exists: {db}/{namespace}")]
    AlreadyExists { db: String, namespace: String },

    /// The database or namespace name is unusable.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Serialization failure while writing the registry.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying storage or lease failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// The taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::Serialization(_) => ErrorKind::Internal,
            Self::Store(e) => e.kind(),
        }
    }
}

/// Convenience type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
