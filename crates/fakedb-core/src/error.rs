//! Error types for the coordination layer.

use std::time::Duration;

use fakedb_registry::RegistryError;
use fakedb_store::{ErrorKind, StoreError};
use thiserror::Error;

/// Errors that can occur while inserting, scanning or converting records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The namespace is not registered.
    #[error("namespace not found: {db}/{namespace}")]
    NotFound { db: String, namespace: String },

    /// The namespace (or another named entity) already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A record does not satisfy the target's schema or model.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A value is not record-shaped, or a model type cannot be used.
    #[error("type error: {0}")]
    Type(String),

    /// A database or namespace name is unusable.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The read barrier did not clear within the configured wait.
    #[error("pending operations on {db} did not clear within {waited:?}")]
    BarrierTimeout { db: String, waited: Duration },

    /// Serialization failure while encoding a record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Registry failure.
    #[error("registry error: {0}")]
    Registry(RegistryError),

    /// Storage or lease failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// The taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Type(_) => ErrorKind::Type,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::BarrierTimeout { .. } => ErrorKind::Timeout,
            Self::Serialization(_) => ErrorKind::Internal,
            Self::Registry(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        // Lift the registry's taxonomy variants so callers match one enum.
        match err {
            RegistryError::NotFound { db, namespace } => Self::NotFound { db, namespace },
            RegistryError::InvalidName { name, reason } => Self::InvalidName { name, reason },
            RegistryError::Store(e) => Self::Store(e),
            other => Self::Registry(other),
        }
    }
}

/// Convenience type alias for coordination operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_are_lifted() {
        let err: CoreError = RegistryError::NotFound {
            db: "db".into(),
            namespace: "users".into(),
        }
        .into();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: CoreError = RegistryError::AlreadyExists {
            db: "db".into(),
            namespace: "users".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn store_errors_keep_their_kind() {
        let err: CoreError = StoreError::NotFound("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
