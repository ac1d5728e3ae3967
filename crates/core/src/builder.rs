//! Recompute path: load a source record, describe it, write it through the
//! internal store path (which never publishes change events).

use crate::cache::{CachedRecord, StoreOutcome};
use crate::catalog::SourceRecord;
use crate::describe::{Description, describe, sort_title};
use crate::key::RecordKey;
use crate::service::RecordCache;
use crate::Error;

/// Full projection of a source record.
fn project(source: &SourceRecord, text: Description, refreshed_at: String) -> CachedRecord {
    let fields = &source.fields;
    CachedRecord {
        key: source.key,
        original_title: fields.original_title.clone(),
        title: fields.title.clone(),
        sort_title: sort_title(fields.title.as_deref().unwrap_or(&fields.original_title)),
        year: fields.year,
        formal_type_id: fields.formal_type_id,
        language_id: fields.language_id,
        source_id: source.detail.source_id(),
        impact_factor: fields.impact_factor,
        points: fields.points,
        index_copernicus: fields.index_copernicus,
        annotation: fields.annotation.clone(),
        modified_at: source.modified_at.clone(),
        description: text.description,
        author_list: text.author_list,
        recorded_authors: text.recorded_authors,
        author_count: text.author_count,
        slug: text.slug,
        search_index: text.search_index,
        fingerprint: String::new(),
        refreshed_at,
    }
}

/// Keep the stored scalar copies and replace only the derived text.
fn with_text(existing: CachedRecord, text: Description, refreshed_at: String) -> CachedRecord {
    CachedRecord {
        description: text.description,
        author_list: text.author_list,
        recorded_authors: text.recorded_authors,
        author_count: text.author_count,
        slug: text.slug,
        search_index: text.search_index,
        fingerprint: String::new(),
        refreshed_at,
        ..existing
    }
}

impl RecordCache {
    /// Recompute and store one cached record.
    ///
    /// With `description_only`, scalar fields are carried over from the stored
    /// row and only the derived text is rebuilt; without a stored row this
    /// falls back to a full recompute.
    ///
    /// Returns `None` when the source record no longer exists. That is a
    /// normal outcome for work scheduled before a deletion, not an error.
    pub async fn recompute(&self, key: RecordKey, description_only: bool) -> Result<Option<CachedRecord>, Error> {
        let _serialized = self.lock_record(key).await;
        let db = self.db();
        let Some(source) = db.load_source_record(key).await? else {
            tracing::debug!(key = %key, "source record gone, skipping recompute");
            return Ok(None);
        };
        let authors = db.load_linked_authors(key).await?;
        let text = describe(self.renderer(), &source, &authors)?;
        let now = chrono::Utc::now().to_rfc3339();

        let existing = if description_only { db.get_cached_record(key).await? } else { None };
        let mut record = match existing {
            Some(existing) => with_text(existing, text, now),
            None => project(&source, text, now),
        };
        record.fingerprint = record.compute_fingerprint();

        match db.store_cached_record(record.clone()).await? {
            StoreOutcome::Written => {
                tracing::debug!(key = %key, description_only, "cached record written");
                Ok(Some(record))
            }
            StoreOutcome::Unchanged => {
                tracing::trace!(key = %key, "cached record unchanged");
                db.get_cached_record(key).await
            }
            StoreOutcome::SourceGone => {
                tracing::debug!(key = %key, "source record deleted during recompute");
                Ok(None)
            }
        }
    }

    /// Synchronous forced recompute of one record, for operators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the source record does not exist.
    pub async fn refresh(&self, key: RecordKey, description_only: bool) -> Result<CachedRecord, Error> {
        let record = self
            .recompute(key, description_only)
            .await?
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        tracing::info!(key = %key, description_only, "record refreshed");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::CacheDb;
    use crate::catalog::{Catalog, LinkedAuthor, NewAuthorLink, RecordDetail, RecordFields};
    use crate::describe::{DescriptionRenderer, PlainRenderer};
    use crate::key::SourceKind;
    use crate::testing::{Lookups, RecordingSink, test_settings};

    /// Cache that is never wired to the catalog, so only explicit recomputes write.
    async fn detached() -> (RecordCache, Catalog) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = RecordCache::new(db.clone(), Arc::new(PlainRenderer), test_settings());
        (cache, Catalog::new(db, Arc::new(RecordingSink::default())))
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let (cache, catalog) = detached().await;
        let source = catalog.create_source("Journal X", None).await.unwrap();
        let key = catalog
            .create_record(
                RecordFields { points: 40.0, ..RecordFields::titled("Foo") },
                RecordDetail::ContinuousPublication { source_id: Some(source) },
            )
            .await
            .unwrap();

        let first = cache.refresh(key, false).await.unwrap();
        let second = cache.refresh(key, false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.points, 40.0);
        assert!(first.description.contains("Foo"));
        assert!(first.description.contains("Journal X"));
    }

    #[tokio::test]
    async fn test_missing_source_is_a_silent_no_op() {
        let (cache, _) = detached().await;
        let key = RecordKey::new(SourceKind::BoundPublication, 12);
        assert!(cache.recompute(key, false).await.unwrap().is_none());
        assert!(matches!(cache.refresh(key, false).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_description_only_keeps_stored_scalars() {
        let (cache, catalog) = detached().await;
        let lookups = Lookups::seed(&catalog).await;
        let key = catalog
            .create_record(RecordFields { points: 10.0, ..RecordFields::titled("Foo") }, RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();
        cache.refresh(key, false).await.unwrap();

        catalog
            .update_record(key, RecordFields { points: 99.0, ..RecordFields::titled("Foo") }, RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();
        catalog
            .add_author_link(key, NewAuthorLink::new(lookups.kowalski, lookups.unit, lookups.author_role))
            .await
            .unwrap();

        let partial = cache.refresh(key, true).await.unwrap();
        assert_eq!(partial.points, 10.0);
        assert_eq!(partial.author_list, vec!["Kowalski Jan"]);

        let full = cache.refresh(key, false).await.unwrap();
        assert_eq!(full.points, 99.0);
    }

    #[tokio::test]
    async fn test_description_only_without_stored_row_is_full() {
        let (cache, catalog) = detached().await;
        let key = catalog
            .create_record(RecordFields { year: Some(1999), ..RecordFields::titled("Foo") }, RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();

        let record = cache.refresh(key, true).await.unwrap();
        assert_eq!(record.year, Some(1999));
        assert_eq!(record.original_title, "Foo");
    }

    #[tokio::test]
    async fn test_render_failure_propagates() {
        struct Broken;
        impl DescriptionRenderer for Broken {
            fn render(&self, _: &SourceRecord, _: &[LinkedAuthor]) -> Result<String, Error> {
                Err(Error::RenderFailed("template missing".into()))
            }
        }

        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = RecordCache::new(db.clone(), Arc::new(Broken), test_settings());
        let catalog = Catalog::new(db, Arc::new(RecordingSink::default()));
        let key = catalog
            .create_record(RecordFields::titled("Foo"), RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();

        assert!(matches!(cache.recompute(key, false).await, Err(Error::RenderFailed(_))));
        assert!(cache.get(key).await.unwrap().is_none());
    }
}
