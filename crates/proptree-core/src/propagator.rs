use std::sync::Arc;

use proptree_store::RecordStore;
use proptree_types::{propagation_chain, ETag, MTime};

use crate::context::RequestContext;

/// What a single propagation pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Ancestors whose etag and mtime were advanced, deepest first.
    pub updated: Vec<String>,
    /// First ancestor that was already as new (or absent); the pass stopped there.
    pub stopped_at: Option<String>,
    /// Ancestor whose update failed in the store; the pass stopped there.
    pub failed_at: Option<String>,
}

impl PropagationReport {
    /// Returns `true` if every ancestor in the chain was advanced.
    pub fn is_complete(&self) -> bool {
        self.stopped_at.is_none() && self.failed_at.is_none()
    }
}

/// Pushes a write's etag and mtime up to its ancestors.
///
/// The chain comes from [`propagation_chain`] and is walked deepest first.
/// An ancestor whose stored mtime is already at or beyond the write's mtime
/// ends the pass: some equal-or-newer write has advanced it, and by the same
/// walk every shallower ancestor too. Failures are logged and reported, never
/// returned as errors; the triggering write stays committed regardless.
#[derive(Clone)]
pub struct Propagator {
    store: Arc<dyn RecordStore>,
}

impl Propagator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn propagate(
        &self,
        ctx: &RequestContext,
        path: &str,
        etag: &ETag,
        mtime: MTime,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        for ancestor in propagation_chain(path) {
            match self.store.conditional_update(&ancestor, etag, mtime).await {
                Ok(true) => {
                    tracing::debug!(
                        trace_id = %ctx.trace_id(),
                        ancestor = %ancestor,
                        %etag,
                        %mtime,
                        "ancestor updated"
                    );
                    report.updated.push(ancestor);
                }
                Ok(false) => {
                    tracing::warn!(
                        trace_id = %ctx.trace_id(),
                        ancestor = %ancestor,
                        %etag,
                        %mtime,
                        "ancestor not updated, stopping propagation"
                    );
                    report.stopped_at = Some(ancestor);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        trace_id = %ctx.trace_id(),
                        ancestor = %ancestor,
                        error = %e,
                        "propagation failed"
                    );
                    report.failed_at = Some(ancestor);
                    break;
                }
            }
        }
        tracing::info!(
            trace_id = %ctx.trace_id(),
            path,
            updated = report.updated.len(),
            "propagated changes"
        );
        report
    }
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptree_store::InMemoryRecordStore;
    use proptree_types::{Record, RecordId};

    async fn seed(store: &InMemoryRecordStore, path: &str, mtime: u64) -> Record {
        let rec = Record::new(RecordId::mint(), path, "", ETag::mint(), MTime::from_secs(mtime));
        store.upsert(&rec).await.unwrap();
        rec
    }

    #[tokio::test]
    async fn updates_every_older_ancestor() {
        let store = Arc::new(InMemoryRecordStore::new());
        seed(&store, "/local/users/d/demo", 1).await;
        seed(&store, "/local/users/d/demo/photos", 1).await;
        let propagator = Propagator::new(store.clone());

        let etag = ETag::mint();
        let report = propagator
            .propagate(
                &RequestContext::default(),
                "/local/users/d/demo/photos/1.png",
                &etag,
                MTime::from_secs(5),
            )
            .await;

        assert!(report.is_complete());
        assert_eq!(
            report.updated,
            vec!["/local/users/d/demo/photos", "/local/users/d/demo"]
        );
        let home = store.get_by_path("/local/users/d/demo").await.unwrap().unwrap();
        assert_eq!(home.etag, etag);
        assert_eq!(home.mtime, MTime::from_secs(5));
    }

    #[tokio::test]
    async fn nothing_to_do_above_home() {
        let store = Arc::new(InMemoryRecordStore::new());
        let propagator = Propagator::new(store);
        let report = propagator
            .propagate(&RequestContext::default(), "/local/users/d", &ETag::mint(), MTime::from_secs(1))
            .await;
        assert_eq!(report, PropagationReport::default());
    }

    #[tokio::test]
    async fn missing_ancestor_stops_the_pass() {
        let store = Arc::new(InMemoryRecordStore::new());
        let home = seed(&store, "/local/users/d/demo", 1).await;
        let propagator = Propagator::new(store.clone());

        let report = propagator
            .propagate(
                &RequestContext::default(),
                "/local/users/d/demo/photos/1.png",
                &ETag::mint(),
                MTime::from_secs(9),
            )
            .await;

        assert_eq!(report.stopped_at.as_deref(), Some("/local/users/d/demo/photos"));
        assert!(report.updated.is_empty());
        let stored = store.get_by_path("/local/users/d/demo").await.unwrap().unwrap();
        assert_eq!(stored, home);
    }
}
