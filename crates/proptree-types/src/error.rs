use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("mtime out of range: {0}")]
    MTimeOutOfRange(i64),

    #[error("empty identifier")]
    EmptyIdentifier,
}
