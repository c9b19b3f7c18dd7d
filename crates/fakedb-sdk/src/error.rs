use fakedb_core::CoreError;
use fakedb_sql::ParseError;
use fakedb_store::{ErrorKind, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("sql {0}")]
    Parse(#[from] ParseError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// The taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::Parse(_) => ErrorKind::Parse,
            Self::Config(_) => ErrorKind::Validation,
            Self::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for SdkError {
    fn from(err: StoreError) -> Self {
        Self::Core(err.into())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
