use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque record identifier.
///
/// Minted once when a path is first written and carried unchanged through
/// later writes and renames.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Mint a fresh random identifier (UUID v4).
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an identifier read back from storage.
    pub fn parse(s: impl Into<String>) -> Result<Self, TypeError> {
        let s = s.into();
        if s.is_empty() {
            return Err(TypeError::EmptyIdentifier);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque version token for a path.
///
/// Two reads returning the same etag saw the same logical version. Nothing
/// may be inferred from the token's contents.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Mint a fresh random token (UUID v4).
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap a token read back from storage.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ETag({})", self.0)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Modification time in whole seconds since the UNIX epoch.
///
/// Besides being metadata, `MTime` orders concurrent writers: a conditional
/// update only lands when its mtime is strictly greater than the stored one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MTime(u64);

impl MTime {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Convert from a signed database column.
    pub fn from_i64(secs: i64) -> Result<Self, TypeError> {
        u64::try_from(secs)
            .map(Self)
            .map_err(|_| TypeError::MTimeOutOfRange(secs))
    }

    /// Convert to a signed database column.
    pub fn to_i64(&self) -> Result<i64, TypeError> {
        i64::try_from(self.0).map_err(|_| TypeError::MTimeOutOfRange(i64::MAX))
    }
}

impl fmt::Debug for MTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MTime({})", self.0)
    }
}

impl fmt::Display for MTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata kept for a single path.
///
/// The serialized form is the wire shape: `{id, path, etag, mtime, checksum}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Canonical absolute path, unique across a store.
    pub path: String,
    pub etag: ETag,
    pub mtime: MTime,
    /// Content hash; empty for directory-only entries.
    pub checksum: String,
}

impl Record {
    pub fn new(
        id: RecordId,
        path: impl Into<String>,
        checksum: impl Into<String>,
        etag: ETag,
        mtime: MTime,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            etag,
            mtime,
            checksum: checksum.into(),
        }
    }

    /// Returns `true` if the record carries no content hash.
    pub fn is_directory_entry(&self) -> bool {
        self.checksum.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} path={} sum={} etag={} mtime={}",
            self.id, self.path, self.checksum, self.etag, self.mtime
        )
    }
}
