//! Error types for query parsing.

use thiserror::Error;

/// A query string outside the supported subset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at byte {offset}: {message}")]
pub struct ParseError {
    /// Byte offset into the query string where the problem starts.
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Convenience type alias for parsing.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
