use std::time::Duration;

/// Coarse classification shared by every FakeDB error type.
///
/// Higher layers wrap [`StoreError`] in their own enums; `kind()` lets callers
/// match on the failure category without caring which layer raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing object, namespace, or record target.
    NotFound,
    /// Duplicate registration or conditional-write violation.
    AlreadyExists,
    /// Schema or record-type mismatch.
    Validation,
    /// A record shape with no derivable mapping.
    Type,
    /// Malformed query string.
    Parse,
    /// Empty or unsafe database, namespace, or object name.
    InvalidName,
    /// A lease or barrier wait exceeded its deadline.
    Timeout,
    /// Storage, encoding, or other infrastructure failure.
    Internal,
}

/// Errors from object store and lease operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A create-if-absent write found an existing object.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// The object path is empty, absolute, or escapes the store root.
    #[error("invalid object path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A bounded lease acquisition ran out of time.
    #[error("timed out acquiring lease {key} after {waited:?}")]
    LeaseTimeout { key: String, waited: Duration },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the local filesystem backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by a cloud object store.
    #[error("object store error: {0}")]
    Backend(String),

    /// The requested backend is not compiled into this build.
    #[error("unsupported backend: {0}")]
    Unsupported(String),
}

impl StoreError {
    /// The taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidPath { .. } => ErrorKind::InvalidName,
            Self::LeaseTimeout { .. } => ErrorKind::Timeout,
            Self::Serialization(_) | Self::Io(_) | Self::Backend(_) | Self::Unsupported(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
