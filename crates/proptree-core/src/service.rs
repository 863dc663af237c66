use std::sync::Arc;

use proptree_store::{PathRewrite, RecordStore, StoreError};
use proptree_types::{clean, is_within, rebase, Clock, ETag, Record, RecordId, SystemClock};

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::propagator::Propagator;

/// The Get/Put/Rm/Mv operations over a record store.
///
/// Every input path is canonicalized with [`clean`] before it reaches the
/// store. Writes stamp records with the injected [`Clock`] and then run a
/// [`Propagator`] pass whose outcome never changes the operation's result.
pub struct PropService {
    store: Arc<dyn RecordStore>,
    propagator: Propagator,
    clock: Arc<dyn Clock>,
}

impl PropService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        let propagator = Propagator::new(store.clone());
        Self {
            store,
            propagator,
            clock,
        }
    }

    /// Build a service stamped with wall-clock time.
    pub fn with_system_clock(store: Arc<dyn RecordStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // ---- Get ----

    /// Fetch the record at `path`.
    ///
    /// With `force_creation`, a missing record is created with an empty
    /// checksum and fetched once more. A failed creation or re-fetch reports
    /// `NotFound`; only a failed first lookup surfaces as a store error.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        path: &str,
        force_creation: bool,
    ) -> CoreResult<Record> {
        let path = clean(path);
        if let Some(record) = self.fetch(ctx, &path).await? {
            return Ok(record);
        }
        if !force_creation {
            return Err(CoreError::NotFound(path));
        }

        tracing::info!(trace_id = %ctx.trace_id(), path = %path, "record missing, forcing creation");
        if let Err(e) = self.write_record(ctx, &path, "").await {
            tracing::warn!(trace_id = %ctx.trace_id(), path = %path, error = %e, "forced creation failed");
            return Err(CoreError::NotFound(path));
        }
        match self.fetch(ctx, &path).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) | Err(_) => Err(CoreError::NotFound(path)),
        }
    }

    // ---- Put ----

    /// Write (or overwrite) the record at `path` and propagate the change.
    pub async fn put(
        &self,
        ctx: &RequestContext,
        path: &str,
        checksum: &str,
    ) -> CoreResult<Record> {
        let path = clean(path);
        self.write_record(ctx, &path, checksum).await
    }

    // ---- Rm ----

    /// Remove `path` and its subtree, returning how many records went away.
    ///
    /// Only records older than the moment Rm started are removed, so a write
    /// racing into the subtree survives.
    pub async fn rm(&self, ctx: &RequestContext, path: &str) -> CoreResult<u64> {
        let path = clean(path);
        let cutoff = self.clock.now();
        let removed = self
            .store
            .delete_older_than(&path, cutoff)
            .await
            .map_err(|e| surface(ctx, &path, e))?;
        tracing::info!(trace_id = %ctx.trace_id(), path = %path, removed, %cutoff, "removed subtree");

        let etag = ETag::mint();
        let mtime = self.clock.now();
        self.propagator.propagate(ctx, &path, &etag, mtime).await;
        Ok(removed)
    }

    // ---- Mv ----

    /// Move `src` and everything under it to `dst`, returning how many
    /// records moved. The rewrite is all-or-nothing.
    pub async fn mv(&self, ctx: &RequestContext, src: &str, dst: &str) -> CoreResult<u64> {
        let src = clean(src);
        let dst = clean(dst);
        if src == dst {
            return Err(CoreError::InvalidRequest(format!(
                "source and destination are both {src}"
            )));
        }
        if is_within(&dst, &src) {
            return Err(CoreError::InvalidRequest(format!(
                "cannot move {src} into its own subtree {dst}"
            )));
        }

        let records = self
            .store
            .get_by_prefix(&src)
            .await
            .map_err(|e| surface(ctx, &src, e))?;
        if records.is_empty() {
            return Err(CoreError::NotFound(src));
        }

        let rewrites = records
            .iter()
            .map(|r| {
                rebase(&r.path, &src, &dst)
                    .map(|to| PathRewrite::new(r.path.clone(), to))
                    .ok_or_else(|| {
                        CoreError::Internal(format!("{} is not under {src}", r.path))
                    })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        self.store
            .rewrite_paths(&rewrites)
            .await
            .map_err(|e| surface(ctx, &src, e))?;
        let moved = rewrites.len() as u64;
        tracing::info!(trace_id = %ctx.trace_id(), src = %src, dst = %dst, moved, "moved subtree");

        // The moved root gets a fresh version even within the same second as
        // its last write. The rewrite is already committed; a failed stamp is
        // only logged.
        let etag = ETag::mint();
        let mtime = self.clock.now();
        if let Some(root) = records.iter().find(|r| r.path == src) {
            let stamped = Record::new(
                root.id.clone(),
                dst.clone(),
                root.checksum.clone(),
                etag.clone(),
                mtime,
            );
            match self.store.upsert(&stamped).await {
                Ok(()) => {
                    tracing::debug!(trace_id = %ctx.trace_id(), path = %dst, %etag, %mtime, "stamped move destination")
                }
                Err(e) => {
                    tracing::warn!(trace_id = %ctx.trace_id(), path = %dst, error = %e, "failed to stamp move destination")
                }
            }
        }
        self.propagator.propagate(ctx, &dst, &etag, mtime).await;
        Ok(moved)
    }

    // ---- Internal helpers ----

    async fn fetch(&self, ctx: &RequestContext, path: &str) -> CoreResult<Option<Record>> {
        self.store
            .get_by_path(path)
            .await
            .map_err(|e| surface(ctx, path, e))
    }

    async fn write_record(
        &self,
        ctx: &RequestContext,
        path: &str,
        checksum: &str,
    ) -> CoreResult<Record> {
        let id = match self.fetch(ctx, path).await? {
            Some(existing) => existing.id,
            None => RecordId::mint(),
        };
        let record = Record::new(id, path, checksum, ETag::mint(), self.clock.now());
        self.store
            .upsert(&record)
            .await
            .map_err(|e| surface(ctx, path, e))?;
        tracing::info!(
            trace_id = %ctx.trace_id(),
            path = %record.path,
            etag = %record.etag,
            mtime = %record.mtime,
            "record written"
        );

        self.propagator
            .propagate(ctx, &record.path, &record.etag, record.mtime)
            .await;
        Ok(record)
    }
}

fn surface(ctx: &RequestContext, path: &str, err: StoreError) -> CoreError {
    tracing::error!(trace_id = %ctx.trace_id(), path, error = %err, "store error");
    CoreError::Store(err)
}

impl std::fmt::Debug for PropService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptree_store::InMemoryRecordStore;
    use proptree_types::{MTime, ManualClock};

    fn service() -> (PropService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(100));
        let store = Arc::new(InMemoryRecordStore::new());
        (PropService::new(store, clock.clone()), clock)
    }

    #[tokio::test]
    async fn put_cleans_the_path() {
        let (svc, _) = service();
        let ctx = RequestContext::default();
        let rec = svc.put(&ctx, "a//b/./c/", "sum").await.unwrap();
        assert_eq!(rec.path, "/a/b/c");
        assert_eq!(rec.mtime, MTime::from_secs(100));
        assert!(svc.store().get_by_path("/a/b/c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mv_rejects_degenerate_targets() {
        let (svc, _) = service();
        let ctx = RequestContext::default();
        svc.put(&ctx, "/a", "").await.unwrap();

        let same = svc.mv(&ctx, "/a", "/a/").await.unwrap_err();
        assert!(matches!(same, CoreError::InvalidRequest(_)));
        let inside = svc.mv(&ctx, "/a", "/a/b").await.unwrap_err();
        assert!(matches!(inside, CoreError::InvalidRequest(_)));
        let root = svc.mv(&ctx, "/", "/b").await.unwrap_err();
        assert!(matches!(root, CoreError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn mv_from_empty_subtree_is_not_found() {
        let (svc, _) = service();
        let err = svc
            .mv(&RequestContext::default(), "/nothing", "/else")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(ref p) if p == "/nothing"));
    }
}
