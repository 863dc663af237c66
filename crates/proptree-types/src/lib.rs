//! Foundation types for proptree.
//!
//! proptree keeps one metadata record per path of a hierarchical namespace and
//! pushes version changes up to ancestor directories so that sync clients can
//! poll a single directory etag instead of walking a subtree. Every other
//! proptree crate depends on `proptree-types`.
//!
//! # Key Types
//!
//! - [`Record`] -- the persisted `{id, path, checksum, etag, mtime}` row
//! - [`RecordId`] -- opaque identifier minted once per path
//! - [`ETag`] -- opaque version token, re-minted on every write
//! - [`MTime`] -- whole-second timestamp, also the concurrency discriminant
//! - [`propagation_chain`] -- the ancestors a write must notify, deepest first
//! - [`Clock`] -- injected time source ([`SystemClock`], [`ManualClock`])

pub mod clock;
pub mod error;
pub mod hierarchy;
pub mod path;
pub mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TypeError;
pub use hierarchy::{propagation_chain, HOME_BOUNDARY_SEGMENTS};
pub use path::{clean, is_within, rebase};
pub use record::{ETag, MTime, Record, RecordId};
