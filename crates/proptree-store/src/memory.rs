use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use proptree_types::{is_within, ETag, MTime, Record};

use crate::error::{StoreError, StoreResult};
use crate::traits::{check_batch, PathRewrite, RecordStore};

/// In-memory, ordered record store.
///
/// Intended for tests and embedding. Records live in a `BTreeMap` keyed by
/// path so subtree scans are range reads. Every operation takes the lock once,
/// which makes each call atomic with respect to the others.
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
}

impl InMemoryRecordStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.read().map(|map| map.len()).unwrap_or_default()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored path, in order.
    pub fn paths(&self) -> Vec<String> {
        self.read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Record>>> {
        self.records
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Record>>> {
        self.records
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Paths in the subtree rooted at `prefix`, in key order.
fn subtree_keys(map: &BTreeMap<String, Record>, prefix: &str) -> Vec<String> {
    // Everything under `prefix` sorts at or after it, so the scan can start
    // there and stop at the first key that no longer shares the prefix.
    map.range(prefix.to_string()..)
        .take_while(|(path, _)| path.starts_with(prefix))
        .filter(|(path, _)| is_within(path, prefix))
        .map(|(path, _)| path.clone())
        .collect()
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_by_path(&self, path: &str) -> StoreResult<Option<Record>> {
        Ok(self.read()?.get(path).cloned())
    }

    async fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Record>> {
        let map = self.read()?;
        Ok(subtree_keys(&map, prefix)
            .into_iter()
            .filter_map(|path| map.get(&path).cloned())
            .collect())
    }

    async fn upsert(&self, record: &Record) -> StoreResult<()> {
        let mut map = self.write()?;
        match map.get_mut(&record.path) {
            Some(existing) => {
                existing.checksum = record.checksum.clone();
                existing.etag = record.etag.clone();
                existing.mtime = record.mtime;
            }
            None => {
                map.insert(record.path.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn conditional_update(
        &self,
        path: &str,
        etag: &ETag,
        mtime: MTime,
    ) -> StoreResult<bool> {
        let mut map = self.write()?;
        match map.get_mut(path) {
            Some(existing) if existing.mtime < mtime => {
                existing.etag = etag.clone();
                existing.mtime = mtime;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_older_than(&self, path: &str, cutoff: MTime) -> StoreResult<u64> {
        let mut map = self.write()?;
        let doomed: Vec<String> = subtree_keys(&map, path)
            .into_iter()
            .filter(|p| map.get(p).is_some_and(|r| r.mtime < cutoff))
            .collect();
        for p in &doomed {
            map.remove(p);
        }
        Ok(doomed.len() as u64)
    }

    async fn rewrite_paths(&self, rewrites: &[PathRewrite]) -> StoreResult<()> {
        check_batch(rewrites)?;
        let mut map = self.write()?;

        // Validate the whole batch before touching the map.
        let sources: HashSet<&str> = rewrites.iter().map(|rw| rw.from.as_str()).collect();
        for rw in rewrites {
            if !map.contains_key(&rw.from) {
                return Err(StoreError::SourceMissing(rw.from.clone()));
            }
            if map.contains_key(&rw.to) && !sources.contains(rw.to.as_str()) {
                return Err(StoreError::PathOccupied(rw.to.clone()));
            }
        }

        let mut moved = Vec::with_capacity(rewrites.len());
        for rw in rewrites {
            if let Some(mut record) = map.remove(&rw.from) {
                record.path = rw.to.clone();
                moved.push(record);
            }
        }
        for record in moved {
            map.insert(record.path.clone(), record);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordStore")
            .field("record_count", &self.len())
            .finish()
    }
}
