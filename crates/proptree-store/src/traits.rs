use async_trait::async_trait;
use proptree_types::{ETag, MTime, Record};

use crate::error::{StoreError, StoreResult};

/// One path change inside an atomic rewrite batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathRewrite {
    pub from: String,
    pub to: String,
}

impl PathRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Path-keyed record storage.
///
/// All implementations must satisfy these invariants:
/// - At most one record per path.
/// - `conditional_update` is the only operation guarded by mtime; it never
///   moves a stored mtime backwards.
/// - `rewrite_paths` is all-or-nothing.
/// - Subtree matching is anchored on the separator: prefix `/foo` covers
///   `/foo` and `/foo/...`, never `/foo1`.
///
/// Paths passed in are expected to be canonical (see [`proptree_types::clean`]).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point lookup. Returns `Ok(None)` if no record exists at `path`.
    async fn get_by_path(&self, path: &str) -> StoreResult<Option<Record>>;

    /// Every record at `prefix` or below it, ordered by path.
    async fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Record>>;

    /// Insert `record`, or overwrite checksum, etag and mtime of the record
    /// already stored at its path. An existing record keeps its ID.
    async fn upsert(&self, record: &Record) -> StoreResult<()>;

    /// Set etag and mtime at `path` only if the stored mtime is strictly
    /// older than `mtime`.
    ///
    /// Returns `true` if the row changed. A missing row returns `false`.
    async fn conditional_update(&self, path: &str, etag: &ETag, mtime: MTime)
        -> StoreResult<bool>;

    /// Delete the record at `path` and its subtree, restricted to records
    /// whose mtime is strictly older than `cutoff`. Returns the number removed.
    async fn delete_older_than(&self, path: &str, cutoff: MTime) -> StoreResult<u64>;

    /// Apply every rewrite in one atomic unit.
    ///
    /// Fails without changing anything if a source path is missing, a target
    /// is occupied by a record outside the batch, or the batch reuses a path.
    async fn rewrite_paths(&self, rewrites: &[PathRewrite]) -> StoreResult<()>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Reject batches that reuse a path, as either source or target.
pub(crate) fn check_batch(rewrites: &[PathRewrite]) -> StoreResult<()> {
    use std::collections::HashSet;

    let mut sources = HashSet::with_capacity(rewrites.len());
    for rw in rewrites {
        if !sources.insert(rw.from.as_str()) {
            return Err(StoreError::InvalidBatch(format!("duplicate source {}", rw.from)));
        }
    }
    let mut targets = HashSet::with_capacity(rewrites.len());
    for rw in rewrites {
        if !targets.insert(rw.to.as_str()) {
            return Err(StoreError::InvalidBatch(format!("duplicate target {}", rw.to)));
        }
        if sources.contains(rw.to.as_str()) {
            return Err(StoreError::InvalidBatch(format!(
                "target {} is also a source",
                rw.to
            )));
        }
    }
    Ok(())
}
