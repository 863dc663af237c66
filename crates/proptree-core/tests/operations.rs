//! End-to-end behaviour of Get/Put/Rm/Mv over the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use proptree_core::{
    CoreError, ETag, InMemoryRecordStore, MTime, ManualClock, PropService, Record,
    RecordId, RecordStore, RequestContext, TraceId,
};
use proptree_store::{PathRewrite, StoreError, StoreResult};

const HOME: &str = "/local/users/d/demo";
const PHOTOS: &str = "/local/users/d/demo/photos";
const IMAGE: &str = "/local/users/d/demo/photos/1.png";

struct Harness {
    svc: PropService,
    store: Arc<InMemoryRecordStore>,
    clock: Arc<ManualClock>,
    ctx: RequestContext,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let svc = PropService::new(store.clone(), clock.clone());
        let ctx = RequestContext::new(TraceId::from_client("test-trace")).with_identity("demo");
        Self {
            svc,
            store,
            clock,
            ctx,
        }
    }

    async fn record(&self, path: &str) -> Option<Record> {
        self.store.get_by_path(path).await.unwrap()
    }
}

// ---- Put ----

#[tokio::test]
async fn first_put_mints_and_second_put_preserves_id() {
    let h = Harness::new();
    let first = h.svc.put(&h.ctx, IMAGE, "sha1:aa").await.unwrap();
    assert_eq!(first.mtime, MTime::from_secs(1_000));

    h.clock.advance(5);
    let second = h.svc.put(&h.ctx, IMAGE, "sha1:bb").await.unwrap();
    assert_eq!(second.id, first.id);
    assert_ne!(second.etag, first.etag);
    assert_eq!(second.mtime, MTime::from_secs(1_005));
    assert_eq!(second.checksum, "sha1:bb");
    assert_eq!(h.record(IMAGE).await, Some(second));
}

#[tokio::test]
async fn put_propagates_to_home() {
    let h = Harness::new();
    h.svc.put(&h.ctx, HOME, "").await.unwrap();
    h.svc.put(&h.ctx, PHOTOS, "").await.unwrap();

    h.clock.advance(10);
    let image = h.svc.put(&h.ctx, IMAGE, "sha1:aa").await.unwrap();

    for ancestor in [PHOTOS, HOME] {
        let rec = h.record(ancestor).await.unwrap();
        assert_eq!(rec.etag, image.etag, "{ancestor}");
        assert_eq!(rec.mtime, image.mtime, "{ancestor}");
    }
}

#[tokio::test]
async fn put_above_home_touches_nothing_else() {
    let h = Harness::new();
    h.svc.put(&h.ctx, "/local/users/d", "").await.unwrap();
    h.clock.advance(1);
    h.svc.put(&h.ctx, "/local/users/d/other", "").await.unwrap();

    let parent = h.record("/local/users/d").await.unwrap();
    assert_eq!(parent.mtime, MTime::from_secs(1_000));
}

#[tokio::test]
async fn propagation_halts_at_first_newer_ancestor() {
    let h = Harness::new();
    h.svc.put(&h.ctx, HOME, "").await.unwrap();
    h.svc.put(&h.ctx, PHOTOS, "").await.unwrap();
    let home_before = h.record(HOME).await.unwrap();

    // Photos moves ahead of the clock; home stays at the old time.
    h.store
        .conditional_update(PHOTOS, &ETag::mint(), MTime::from_secs(5_000))
        .await
        .unwrap();

    h.clock.advance(10);
    h.svc.put(&h.ctx, IMAGE, "").await.unwrap();

    assert_eq!(h.record(PHOTOS).await.unwrap().mtime, MTime::from_secs(5_000));
    assert_eq!(h.record(HOME).await.unwrap(), home_before);
}

#[tokio::test]
async fn propagation_failure_does_not_fail_put() {
    let inner = InMemoryRecordStore::new();
    let store = Arc::new(FlakyStore::new(inner));
    let clock = Arc::new(ManualClock::new(1_000));
    let svc = PropService::new(store.clone(), clock.clone());
    let ctx = RequestContext::default();

    svc.put(&ctx, HOME, "").await.unwrap();
    let home_before = store.get_by_path(HOME).await.unwrap().unwrap();

    store.fail_updates.store(true, Ordering::SeqCst);
    clock.advance(3);
    let image = svc.put(&ctx, "/local/users/d/demo/1.png", "sha1:cc").await.unwrap();

    assert_eq!(store.get_by_path(&image.path).await.unwrap(), Some(image));
    assert_eq!(store.get_by_path(HOME).await.unwrap(), Some(home_before));
}

// ---- Get ----

#[tokio::test]
async fn get_missing_without_force_has_no_side_effects() {
    let h = Harness::new();
    let err = h.svc.get(&h.ctx, IMAGE, false).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(ref p) if p == IMAGE));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn get_with_force_creates_the_record() {
    let h = Harness::new();
    let created = h.svc.get(&h.ctx, IMAGE, true).await.unwrap();
    assert_eq!(created.path, IMAGE);
    assert_eq!(created.checksum, "");
    assert_eq!(created.mtime, MTime::from_secs(1_000));

    let again = h.svc.get(&h.ctx, IMAGE, true).await.unwrap();
    assert_eq!(again, created);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn get_returns_existing_record() {
    let h = Harness::new();
    let put = h.svc.put(&h.ctx, "/a/b", "sha1:dd").await.unwrap();
    assert_eq!(h.svc.get(&h.ctx, "/a/b/", false).await.unwrap(), put);
}

// ---- Rm ----

#[tokio::test]
async fn rm_removes_only_records_older_than_cutoff() {
    let h = Harness::new();
    for p in [PHOTOS, IMAGE, "/local/users/d/demo/photos2"] {
        h.svc.put(&h.ctx, p, "").await.unwrap();
    }
    let now = h.clock.advance(10);
    // Landed in the same second Rm starts: survives the cutoff.
    h.store
        .upsert(&Record::new(
            RecordId::mint(),
            "/local/users/d/demo/photos/2.png",
            "",
            ETag::mint(),
            now,
        ))
        .await
        .unwrap();

    let removed = h.svc.rm(&h.ctx, PHOTOS).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(
        h.store.paths(),
        vec![
            "/local/users/d/demo/photos/2.png".to_string(),
            "/local/users/d/demo/photos2".to_string(),
        ]
    );
}

#[tokio::test]
async fn rm_propagates_the_deletion() {
    let h = Harness::new();
    for p in [HOME, PHOTOS, IMAGE] {
        h.svc.put(&h.ctx, p, "").await.unwrap();
    }
    let before = h.record(HOME).await.unwrap();

    h.clock.advance(7);
    assert_eq!(h.svc.rm(&h.ctx, IMAGE).await.unwrap(), 1);

    let home = h.record(HOME).await.unwrap();
    assert_ne!(home.etag, before.etag);
    assert_eq!(home.mtime, MTime::from_secs(1_007));
}

#[tokio::test]
async fn rm_missing_path_removes_nothing() {
    let h = Harness::new();
    assert_eq!(h.svc.rm(&h.ctx, "/ghost").await.unwrap(), 0);
}

// ---- Mv ----

#[tokio::test]
async fn mv_relocates_subtree_with_suffixes() {
    let h = Harness::new();
    h.svc.put(&h.ctx, HOME, "").await.unwrap();
    let photos = h.svc.put(&h.ctx, PHOTOS, "").await.unwrap();
    let image = h.svc.put(&h.ctx, IMAGE, "sha1:ee").await.unwrap();
    h.svc.put(&h.ctx, "/local/users/d/demo/photos2", "").await.unwrap();

    h.clock.advance(20);
    let moved = h
        .svc
        .mv(&h.ctx, PHOTOS, "/local/users/d/demo/pictures")
        .await
        .unwrap();
    assert_eq!(moved, 2);

    assert!(h.record(PHOTOS).await.is_none());
    assert!(h.record(IMAGE).await.is_none());
    assert!(h.record("/local/users/d/demo/photos2").await.is_some());

    let moved_image = h.record("/local/users/d/demo/pictures/1.png").await.unwrap();
    assert_eq!(moved_image.id, image.id);
    assert_eq!(moved_image.checksum, "sha1:ee");

    let root = h.record("/local/users/d/demo/pictures").await.unwrap();
    assert_eq!(root.id, photos.id);
    assert_eq!(root.mtime, MTime::from_secs(1_020));

    let home = h.record(HOME).await.unwrap();
    assert_eq!(home.etag, root.etag);
    assert_eq!(home.mtime, MTime::from_secs(1_020));
}

#[tokio::test]
async fn mv_conflict_leaves_every_path_unchanged() {
    let h = Harness::new();
    for p in ["/s", "/s/a", "/s/b", "/t/b"] {
        h.svc.put(&h.ctx, p, "").await.unwrap();
    }
    let before = h.store.paths();

    let err = h.svc.mv(&h.ctx, "/s", "/t").await.unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::PathOccupied(ref p)) if p == "/t/b"));
    assert_eq!(h.store.paths(), before);
}

#[tokio::test]
async fn mv_into_own_subtree_is_invalid() {
    let h = Harness::new();
    h.svc.put(&h.ctx, "/s", "").await.unwrap();
    let err = h.svc.mv(&h.ctx, "/s", "/s/inner").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidRequest(_)));
    assert_eq!(h.store.paths(), vec!["/s".to_string()]);
}

#[tokio::test]
async fn mv_within_the_same_second_gives_the_root_a_new_etag() {
    let h = Harness::new();
    h.svc.put(&h.ctx, HOME, "").await.unwrap();
    let src = h.svc.put(&h.ctx, PHOTOS, "sha1:ff").await.unwrap();

    let dst = "/local/users/d/demo/pictures";
    assert_eq!(h.svc.mv(&h.ctx, PHOTOS, dst).await.unwrap(), 1);

    let moved = h.record(dst).await.unwrap();
    assert_eq!(moved.id, src.id);
    assert_eq!(moved.checksum, "sha1:ff");
    assert_ne!(moved.etag, src.etag);
    assert_eq!(moved.mtime, MTime::from_secs(1_000));
}

// ---- Concurrency ----

#[tokio::test]
async fn same_second_sibling_write_leaves_home_under_notified() {
    // Two writes under different children of home land in the same second.
    // The second one advances its own parent but stops at home, which keeps
    // the first write's etag.
    let h = Harness::new();
    for p in [HOME, PHOTOS, "/local/users/d/demo/music"] {
        h.svc.put(&h.ctx, p, "").await.unwrap();
    }

    h.clock.advance(1);
    let first = h.svc.put(&h.ctx, IMAGE, "").await.unwrap();
    let second = h
        .svc
        .put(&h.ctx, "/local/users/d/demo/music/song.mp3", "")
        .await
        .unwrap();
    assert_eq!(first.mtime, second.mtime);

    let music = h.record("/local/users/d/demo/music").await.unwrap();
    assert_eq!(music.etag, second.etag);
    let home = h.record(HOME).await.unwrap();
    assert_eq!(home.etag, first.etag);
}

#[tokio::test]
async fn concurrent_puts_converge() {
    let h = Arc::new(Harness::new());
    h.svc.put(&h.ctx, HOME, "").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.clock.advance(1);
            h.svc
                .put(&h.ctx, &format!("{HOME}/file-{i}"), "")
                .await
                .unwrap()
        }));
    }
    let mut latest = MTime::from_secs(0);
    for task in tasks {
        latest = latest.max(task.await.unwrap().mtime);
    }

    assert_eq!(h.store.len(), 9);
    assert_eq!(h.record(HOME).await.unwrap().mtime, latest);
}

// ---- Store failures ----

fn flaky_service() -> (PropService, Arc<FlakyStore>, Arc<ManualClock>) {
    let store = Arc::new(FlakyStore::new(InMemoryRecordStore::new()));
    let clock = Arc::new(ManualClock::new(1_000));
    (PropService::new(store.clone(), clock.clone()), store, clock)
}

#[tokio::test]
async fn forced_get_reports_not_found_when_creation_fails() {
    let (svc, store, _) = flaky_service();
    store.fail_upserts.store(true, Ordering::SeqCst);

    let err = svc.get(&RequestContext::default(), IMAGE, true).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(ref p) if p == IMAGE));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn forced_get_reports_not_found_when_refetch_fails() {
    let (svc, store, _) = flaky_service();
    store.break_lookups_on_upsert.store(true, Ordering::SeqCst);

    let err = svc.get(&RequestContext::default(), IMAGE, true).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(ref p) if p == IMAGE));
    assert_eq!(store.inner.paths(), vec![IMAGE.to_string()]);
}

#[tokio::test]
async fn get_surfaces_a_failed_first_lookup() {
    let (svc, store, _) = flaky_service();
    store.fail_lookups.store(true, Ordering::SeqCst);

    let err = svc.get(&RequestContext::default(), IMAGE, true).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn put_surfaces_a_failed_upsert() {
    let (svc, store, _) = flaky_service();
    store.fail_upserts.store(true, Ordering::SeqCst);

    let err = svc.put(&RequestContext::default(), IMAGE, "sha1:aa").await.unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Poisoned(_))));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn rm_failure_leaves_ancestors_untouched() {
    let (svc, store, clock) = flaky_service();
    let ctx = RequestContext::default();
    for p in [HOME, PHOTOS, IMAGE] {
        svc.put(&ctx, p, "").await.unwrap();
    }
    let mut before = Vec::new();
    for p in [HOME, PHOTOS, IMAGE] {
        before.push(store.get_by_path(p).await.unwrap());
    }

    store.fail_deletes.store(true, Ordering::SeqCst);
    clock.advance(5);
    let err = svc.rm(&ctx, IMAGE).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Poisoned(_))));

    let mut after = Vec::new();
    for p in [HOME, PHOTOS, IMAGE] {
        after.push(store.get_by_path(p).await.unwrap());
    }
    assert_eq!(after, before);
}

// ---- Test doubles ----

/// Delegates to an in-memory store, failing whichever calls are switched on.
struct FlakyStore {
    inner: InMemoryRecordStore,
    fail_lookups: AtomicBool,
    fail_upserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    /// Turns on `fail_lookups` after the next successful upsert.
    break_lookups_on_upsert: AtomicBool,
}

impl FlakyStore {
    fn new(inner: InMemoryRecordStore) -> Self {
        Self {
            inner,
            fail_lookups: AtomicBool::new(false),
            fail_upserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            break_lookups_on_upsert: AtomicBool::new(false),
        }
    }
}

fn injected(switch: &AtomicBool) -> StoreResult<()> {
    if switch.load(Ordering::SeqCst) {
        return Err(StoreError::Poisoned("injected failure".into()));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get_by_path(&self, path: &str) -> StoreResult<Option<Record>> {
        injected(&self.fail_lookups)?;
        self.inner.get_by_path(path).await
    }

    async fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Record>> {
        injected(&self.fail_lookups)?;
        self.inner.get_by_prefix(prefix).await
    }

    async fn upsert(&self, record: &Record) -> StoreResult<()> {
        injected(&self.fail_upserts)?;
        self.inner.upsert(record).await?;
        if self.break_lookups_on_upsert.swap(false, Ordering::SeqCst) {
            self.fail_lookups.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn conditional_update(&self, path: &str, etag: &ETag, mtime: MTime) -> StoreResult<bool> {
        injected(&self.fail_updates)?;
        self.inner.conditional_update(path, etag, mtime).await
    }

    async fn delete_older_than(&self, path: &str, cutoff: MTime) -> StoreResult<u64> {
        injected(&self.fail_deletes)?;
        self.inner.delete_older_than(path, cutoff).await
    }

    async fn rewrite_paths(&self, rewrites: &[PathRewrite]) -> StoreResult<()> {
        self.inner.rewrite_paths(rewrites).await
    }
}
