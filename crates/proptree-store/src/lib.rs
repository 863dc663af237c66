//! Path-keyed record storage for proptree.
//!
//! A store holds one [`Record`](proptree_types::Record) per canonical path and
//! offers exactly the primitives the propagation protocol needs: point lookup,
//! subtree scan, unconditional upsert, mtime-guarded update, cutoff-bounded
//! subtree delete, and an atomic batch of path rewrites.
//!
//! # Storage Backends
//!
//! All backends implement the [`RecordStore`] trait:
//!
//! - [`InMemoryRecordStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`SqliteRecordStore`] -- sqlx/SQLite store, one table unique on `path`
//!
//! # Design Rules
//!
//! 1. The store never decides whether a write is newer; only
//!    `conditional_update` compares mtimes.
//! 2. Subtree operations are single calls, never chunked.
//! 3. Rewrite batches are all-or-nothing.
//! 4. Backend errors are propagated, never retried.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use traits::{PathRewrite, RecordStore};

use std::sync::Arc;

/// Open a store from a data source name.
///
/// - `memory` or `memory://` opens an empty [`InMemoryRecordStore`].
/// - any `sqlite:` URL opens a [`SqliteRecordStore`].
pub async fn open(dsn: &str) -> StoreResult<Arc<dyn RecordStore>> {
    let dsn = dsn.trim();
    if dsn == "memory" || dsn == "memory://" {
        tracing::info!("using in-memory record store");
        return Ok(Arc::new(InMemoryRecordStore::new()) as Arc<dyn RecordStore>);
    }
    if dsn.starts_with("sqlite:") {
        let store = SqliteRecordStore::connect(dsn).await?;
        return Ok(Arc::new(store) as Arc<dyn RecordStore>);
    }
    Err(StoreError::UnsupportedDsn(dsn.to_string()))
}
