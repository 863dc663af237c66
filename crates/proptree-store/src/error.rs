/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failure reported by the backing database (connection, query, transaction).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A rename target is already taken by a record outside the batch.
    #[error("path already occupied: {0}")]
    PathOccupied(String),

    /// A rename source disappeared before the batch could be applied.
    #[error("record vanished during rewrite: {0}")]
    SourceMissing(String),

    /// The rewrite batch itself is inconsistent.
    #[error("invalid rewrite batch: {0}")]
    InvalidBatch(String),

    /// A value cannot be represented by the backend.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A stored row could not be decoded into a record.
    #[error("corrupt record at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// The data source string names no known backend.
    #[error("unsupported data source: {0}")]
    UnsupportedDsn(String),

    /// I/O error while preparing the backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An in-process lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
