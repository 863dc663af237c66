//! Core operations for proptree.
//!
//! [`PropService`] implements the four operations clients see (Get, Put, Rm,
//! Mv) on top of any [`RecordStore`](proptree_store::RecordStore). Every write
//! is followed by a best-effort [`Propagator`] pass that pushes the new etag
//! and mtime up to the ancestors between the written path and its home
//! anchor, stopping at the first ancestor that is already as new.

pub mod context;
pub mod error;
pub mod propagator;
pub mod service;

pub use context::{RequestContext, TraceId};
pub use error::{CoreError, CoreResult};
pub use propagator::{PropagationReport, Propagator};
pub use service::PropService;

// Re-export key types
pub use proptree_store::{InMemoryRecordStore, RecordStore, SqliteRecordStore};
pub use proptree_types::{Clock, ETag, MTime, ManualClock, Record, RecordId, SystemClock};
