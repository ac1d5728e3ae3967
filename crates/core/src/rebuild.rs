//! Full rebuild of the record cache from the source tables.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::key::RecordKey;
use crate::service::RecordCache;
use crate::Error;

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RebuildReport {
    /// Source records visited.
    pub total: usize,
    pub succeeded: usize,
    /// Records whose recompute returned an error.
    pub failed: usize,
    /// Cached rows removed because their source record no longer exists.
    pub purged: u64,
    /// Partitions whose worker panicked; their records count as neither succeeded nor failed.
    pub aborted_partitions: usize,
}

/// Split `items` into at most `parts` contiguous chunks whose sizes differ by at most one.
pub fn partition<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    let parts = parts.max(1).min(items.len().max(1));
    let (base, extra) = (items.len() / parts, items.len() % parts);

    let mut chunks = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        chunks.push(items[start..start + len].to_vec());
        start += len;
    }
    chunks.retain(|c| !c.is_empty());
    chunks
}

impl RecordCache {
    /// Recompute every source record, bypassing the router and scheduler.
    ///
    /// Rebuilds are serialized: a second call waits for the first to finish.
    /// The controller is held disabled for the duration and restored to its
    /// previous state afterwards, even if the rebuild fails. Per-record
    /// failures are logged and counted. The author index is not refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero partition count, or a
    /// database error if the source keys cannot be listed.
    pub async fn full_rebuild(&self, partition_count: usize) -> Result<RebuildReport, Error> {
        if partition_count == 0 {
            return Err(Error::InvalidInput("partition count must be at least 1".into()));
        }

        let _exclusive = self.lock_rebuild().await;
        let _suspended = self.controller().suspend();
        let started = std::time::Instant::now();

        let purged = self.db().purge_orphaned_records().await?;
        let keys = self.db().list_source_keys().await?;
        let chunks = partition(&keys, partition_count);
        let workers = self.settings().rebuild_workers.max(1);
        tracing::info!(records = keys.len(), partitions = chunks.len(), workers, purged, "full rebuild started");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut join_set = JoinSet::new();

        for chunk in chunks {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::TaskFailed(e.to_string()))?;
            let cache = self.clone();

            join_set.spawn(async move {
                let _permit = permit;
                cache.rebuild_chunk(chunk).await
            });
        }

        let mut report = RebuildReport { total: keys.len(), purged, ..Default::default() };
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((succeeded, failed)) => {
                    report.succeeded += succeeded;
                    report.failed += failed;
                }
                Err(e) => {
                    tracing::error!(error = %e, "rebuild partition aborted");
                    report.aborted_partitions += 1;
                }
            }
        }

        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            aborted_partitions = report.aborted_partitions,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "full rebuild finished"
        );
        Ok(report)
    }

    async fn rebuild_chunk(&self, keys: Vec<RecordKey>) -> (usize, usize) {
        let (mut succeeded, mut failed) = (0, 0);
        for key in keys {
            match self.recompute(key, false).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "rebuild failed for record");
                    failed += 1;
                }
            }
        }
        (succeeded, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheDb, CachedRecord};
    use crate::catalog::{Catalog, LinkedAuthor, NewAuthorLink, RecordDetail, RecordFields, SourceRecord};
    use crate::describe::{DescriptionRenderer, PlainRenderer};
    use crate::key::SourceKind;
    use crate::testing::{Lookups, RecordingSink, test_settings, wired};

    #[test]
    fn test_partition_sizes() {
        let items: Vec<u32> = (0..10).collect();
        let sizes: Vec<usize> = partition(&items, 3).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(partition(&items, 3).concat(), items);

        assert_eq!(partition(&items[..2], 5).len(), 2);
        assert!(partition::<u32>(&[], 4).is_empty());
        assert_eq!(partition(&items, 0).len(), 1);
    }

    async fn populate(catalog: &Catalog) {
        let lookups = Lookups::seed(catalog).await;
        let source = catalog.create_source("Journal X", None).await.unwrap();
        let nowak = catalog.create_author("Nowak", "Anna").await.unwrap();

        let article = catalog
            .create_record(
                RecordFields { year: Some(2019), points: 70.0, ..RecordFields::titled("Foo") },
                RecordDetail::ContinuousPublication { source_id: Some(source) },
            )
            .await
            .unwrap();
        let book = catalog
            .create_record(
                RecordFields::titled("A Book"),
                RecordDetail::BoundPublication { publisher: Some("PWN".into()), isbn: None },
            )
            .await
            .unwrap();
        catalog
            .create_record(
                RecordFields::titled("On Things"),
                RecordDetail::HabilitationThesis { author_id: nowak, unit_id: Some(lookups.unit), publisher: None },
            )
            .await
            .unwrap();

        for (record, author) in [(article, lookups.kowalski), (article, nowak), (book, nowak)] {
            catalog
                .add_author_link(record, NewAuthorLink::new(author, lookups.unit, lookups.author_role))
                .await
                .unwrap();
        }
    }

    fn without_timestamps(records: Vec<CachedRecord>) -> Vec<CachedRecord> {
        records
            .into_iter()
            .map(|r| CachedRecord { refreshed_at: String::new(), ..r })
            .collect()
    }

    #[tokio::test]
    async fn test_rebuild_matches_incremental_path() {
        let (incremental, catalog_a) = wired().await;
        populate(&catalog_a).await;
        incremental.wait_idle().await;

        let db = CacheDb::open_in_memory().await.unwrap();
        let rebuilt = RecordCache::new(db.clone(), Arc::new(PlainRenderer), test_settings());
        let catalog_b = Catalog::new(db, Arc::new(rebuilt.clone()));
        populate(&catalog_b).await;
        assert_eq!(rebuilt.db().cached_record_count().await.unwrap(), 0);

        let report = rebuilt.full_rebuild(2).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);

        assert_eq!(
            without_timestamps(incremental.db().list_cached_records().await.unwrap()),
            without_timestamps(rebuilt.db().list_cached_records().await.unwrap())
        );
    }

    #[tokio::test]
    async fn test_rebuild_restores_controller_state() {
        let (cache, _) = wired().await;
        cache.full_rebuild(4).await.unwrap();
        assert!(cache.is_enabled());

        cache.disable().unwrap();
        cache.full_rebuild(4).await.unwrap();
        assert!(!cache.is_enabled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_rebuilds_restore_enabled_state() {
        let (cache, catalog) = wired().await;
        for i in 0..40 {
            catalog
                .create_record(RecordFields::titled(format!("Record {i}")), RecordDetail::Patent { patent_number: None })
                .await
                .unwrap();
        }
        cache.wait_idle().await;

        for _ in 0..10 {
            assert!(cache.is_enabled());
            let first = tokio::spawn({
                let cache = cache.clone();
                async move { cache.full_rebuild(4).await }
            });
            let second = tokio::spawn({
                let cache = cache.clone();
                async move { cache.full_rebuild(3).await }
            });

            assert_eq!(first.await.unwrap().unwrap().succeeded, 40);
            assert_eq!(second.await.unwrap().unwrap().succeeded, 40);
            assert!(cache.is_enabled());
        }
    }

    #[tokio::test]
    async fn test_rebuild_counts_failures_and_continues() {
        struct RejectsPatents;
        impl DescriptionRenderer for RejectsPatents {
            fn render(&self, record: &SourceRecord, authors: &[LinkedAuthor]) -> Result<String, Error> {
                if record.key.kind == SourceKind::Patent {
                    return Err(Error::RenderFailed("no patent template".into()));
                }
                PlainRenderer.render(record, authors)
            }
        }

        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = RecordCache::new(db.clone(), Arc::new(RejectsPatents), test_settings());
        let catalog = Catalog::new(db, Arc::new(RecordingSink::default()));
        for detail in [
            RecordDetail::Patent { patent_number: None },
            RecordDetail::BoundPublication { publisher: None, isbn: None },
            RecordDetail::Patent { patent_number: Some("PL-2".into()) },
        ] {
            catalog.create_record(RecordFields::titled("X"), detail).await.unwrap();
        }

        let report = cache.full_rebuild(3).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(cache.db().cached_record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_purges_orphans() {
        let (cache, catalog) = wired().await;
        let key = catalog
            .create_record(RecordFields::titled("Foo"), RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();
        cache.wait_idle().await;

        cache.disable().unwrap();
        catalog.delete_record(key).await.unwrap();
        assert!(cache.get(key).await.unwrap().is_some());

        let report = cache.full_rebuild(1).await.unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(report.total, 0);
        assert!(cache.get(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_partitions_rejected() {
        let (cache, _) = wired().await;
        assert!(matches!(cache.full_rebuild(0).await, Err(Error::InvalidInput(_))));
        assert!(cache.is_enabled());
    }
}
