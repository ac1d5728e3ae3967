//! Unified record store: one denormalized row per live source record.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::{self, OptionalExtension, params, types::Type};

use super::{CacheDb, Error, hash};
use crate::catalog::source_exists;
use crate::key::{RecordKey, SourceKind};

/// A cached projection of one source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CachedRecord {
    pub key: RecordKey,
    pub original_title: String,
    pub title: Option<String>,
    pub sort_title: String,
    pub year: Option<i32>,
    pub formal_type_id: Option<i64>,
    pub language_id: Option<i64>,
    pub source_id: Option<i64>,
    pub impact_factor: f64,
    pub points: f64,
    pub index_copernicus: f64,
    pub annotation: String,
    /// Modification time of the source record at the time of the refresh.
    pub modified_at: String,
    pub description: String,
    /// Canonical author names in list order.
    pub author_list: Vec<String>,
    pub recorded_authors: String,
    pub author_count: i64,
    pub slug: String,
    pub search_index: String,
    /// Digest of every content field above; equal digests mean nothing to write.
    pub fingerprint: String,
    /// When the stored content last changed.
    pub refreshed_at: String,
}

impl CachedRecord {
    /// Digest over every content field, excluding the fingerprint and refresh time.
    pub fn compute_fingerprint(&self) -> String {
        let numbers = [
            self.year.map(|y| y.to_string()).unwrap_or_default(),
            self.formal_type_id.map(|v| v.to_string()).unwrap_or_default(),
            self.language_id.map(|v| v.to_string()).unwrap_or_default(),
            self.source_id.map(|v| v.to_string()).unwrap_or_default(),
            self.impact_factor.to_string(),
            self.points.to_string(),
            self.index_copernicus.to_string(),
            self.author_count.to_string(),
        ];
        let key = self.key.to_string();

        hash::fingerprint(
            [
                key.as_str(),
                self.original_title.as_str(),
                self.title.as_deref().unwrap_or("\u{1}"),
                self.sort_title.as_str(),
                self.annotation.as_str(),
                self.modified_at.as_str(),
                self.description.as_str(),
                self.recorded_authors.as_str(),
                self.slug.as_str(),
                self.search_index.as_str(),
            ]
            .into_iter()
            .chain(numbers.iter().map(String::as_str))
            .chain(self.author_list.iter().map(String::as_str)),
        )
    }
}

/// Result of writing a freshly computed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Row inserted or content changed.
    Written,
    /// Stored fingerprint matched; nothing was written.
    Unchanged,
    /// The source record disappeared; any cached row was removed instead.
    SourceGone,
}

pub(super) const SELECT_COLUMNS: &str = "source_kind, local_id, original_title, title, sort_title, year, formal_type_id,
    language_id, source_id, impact_factor, points, index_copernicus, annotation, modified_at, description,
    author_list, recorded_authors, author_count, slug, search_index, fingerprint, refreshed_at";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::from(message))
}

pub(crate) fn cached_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedRecord> {
    let kind: String = row.get(0)?;
    let kind: SourceKind = kind.parse().map_err(|e: Error| conversion_error(0, e.to_string()))?;
    let author_list: String = row.get(15)?;
    let author_list: Vec<String> =
        serde_json::from_str(&author_list).map_err(|e| conversion_error(15, e.to_string()))?;

    Ok(CachedRecord {
        key: RecordKey::new(kind, row.get(1)?),
        original_title: row.get(2)?,
        title: row.get(3)?,
        sort_title: row.get(4)?,
        year: row.get(5)?,
        formal_type_id: row.get(6)?,
        language_id: row.get(7)?,
        source_id: row.get(8)?,
        impact_factor: row.get(9)?,
        points: row.get(10)?,
        index_copernicus: row.get(11)?,
        annotation: row.get(12)?,
        modified_at: row.get(13)?,
        description: row.get(14)?,
        author_list,
        recorded_authors: row.get(16)?,
        author_count: row.get(17)?,
        slug: row.get(18)?,
        search_index: row.get(19)?,
        fingerprint: row.get(20)?,
        refreshed_at: row.get(21)?,
    })
}

fn delete_cached(conn: &rusqlite::Connection, key: RecordKey) -> rusqlite::Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM cached_records WHERE source_kind = ?1 AND local_id = ?2",
        params![key.kind.as_str(), key.id],
    )?;
    Ok(deleted > 0)
}

impl CacheDb {
    /// Get the cached record for a key.
    ///
    /// Returns None if the record has not been cached (or its source is gone).
    pub async fn get_cached_record(&self, key: RecordKey) -> Result<Option<CachedRecord>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<CachedRecord>, Error> {
                let record = conn
                    .query_row(
                        &format!("SELECT {SELECT_COLUMNS} FROM cached_records WHERE source_kind = ?1 AND local_id = ?2"),
                        params![key.kind.as_str(), key.id],
                        cached_from_row,
                    )
                    .optional()?;
                Ok(record)
            })
            .await
            .map_err(Error::from)
    }

    /// Every cached record, ordered by key.
    pub async fn list_cached_records(&self) -> Result<Vec<CachedRecord>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CachedRecord>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM cached_records ORDER BY source_kind, local_id"
                ))?;
                let rows = stmt.query_map([], cached_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn cached_record_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM cached_records", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Write a computed record unless its content is already stored.
    ///
    /// The source row is re-checked inside the same call so a record deleted
    /// between load and write is not resurrected.
    pub(crate) async fn store_cached_record(&self, record: CachedRecord) -> Result<StoreOutcome, Error> {
        self.conn
            .call(move |conn| -> Result<StoreOutcome, Error> {
                let tx = conn.transaction()?;
                if !source_exists(&tx, record.key)? {
                    delete_cached(&tx, record.key)?;
                    tx.commit()?;
                    return Ok(StoreOutcome::SourceGone);
                }

                let stored: Option<String> = tx
                    .query_row(
                        "SELECT fingerprint FROM cached_records WHERE source_kind = ?1 AND local_id = ?2",
                        params![record.key.kind.as_str(), record.key.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if stored.as_deref() == Some(record.fingerprint.as_str()) {
                    return Ok(StoreOutcome::Unchanged);
                }

                tx.execute(
                    "INSERT INTO cached_records (
                        source_kind, local_id, original_title, title, sort_title, year, formal_type_id,
                        language_id, source_id, impact_factor, points, index_copernicus, annotation, modified_at,
                        description, author_list, recorded_authors, author_count, slug, search_index,
                        fingerprint, refreshed_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
                               ?20, ?21, ?22)
                     ON CONFLICT(source_kind, local_id) DO UPDATE SET
                        original_title = excluded.original_title,
                        title = excluded.title,
                        sort_title = excluded.sort_title,
                        year = excluded.year,
                        formal_type_id = excluded.formal_type_id,
                        language_id = excluded.language_id,
                        source_id = excluded.source_id,
                        impact_factor = excluded.impact_factor,
                        points = excluded.points,
                        index_copernicus = excluded.index_copernicus,
                        annotation = excluded.annotation,
                        modified_at = excluded.modified_at,
                        description = excluded.description,
                        author_list = excluded.author_list,
                        recorded_authors = excluded.recorded_authors,
                        author_count = excluded.author_count,
                        slug = excluded.slug,
                        search_index = excluded.search_index,
                        fingerprint = excluded.fingerprint,
                        refreshed_at = excluded.refreshed_at",
                    params![
                        record.key.kind.as_str(),
                        record.key.id,
                        record.original_title,
                        record.title,
                        record.sort_title,
                        record.year,
                        record.formal_type_id,
                        record.language_id,
                        record.source_id,
                        record.impact_factor,
                        record.points,
                        record.index_copernicus,
                        record.annotation,
                        record.modified_at,
                        record.description,
                        serde_json::to_string(&record.author_list)?,
                        record.recorded_authors,
                        record.author_count,
                        record.slug,
                        record.search_index,
                        record.fingerprint,
                        record.refreshed_at,
                    ],
                )?;
                tx.commit()?;
                Ok(StoreOutcome::Written)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the cached row for a key. Returns whether a row existed.
    pub(crate) async fn evict_cached_record(&self, key: RecordKey) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> { Ok(delete_cached(conn, key)?) })
            .await
            .map_err(Error::from)
    }

    /// Delete cached rows whose source record no longer exists.
    pub async fn purge_orphaned_records(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let mut purged = 0;
                for kind in SourceKind::ALL {
                    purged += conn.execute(
                        &format!(
                            "DELETE FROM cached_records
                             WHERE source_kind = ?1 AND local_id NOT IN (SELECT id FROM {})",
                            kind.table()
                        ),
                        params![kind.as_str()],
                    )?;
                }
                Ok(purged as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RecordDetail, RecordFields};
    use crate::testing::recording_catalog;

    fn sample(key: RecordKey) -> CachedRecord {
        let mut record = CachedRecord {
            key,
            original_title: "Foo".into(),
            title: None,
            sort_title: "foo".into(),
            year: Some(2021),
            formal_type_id: None,
            language_id: None,
            source_id: None,
            impact_factor: 1.5,
            points: 20.0,
            index_copernicus: 0.0,
            annotation: String::new(),
            modified_at: "2021-01-01T00:00:00+00:00".into(),
            description: "Foo. 2021.".into(),
            author_list: vec!["Kowalski Jan".into()],
            recorded_authors: "Kowalski J.".into(),
            author_count: 1,
            slug: "foo-patent-1".into(),
            search_index: "foo".into(),
            fingerprint: String::new(),
            refreshed_at: "2021-01-01T00:00:00+00:00".into(),
        };
        record.fingerprint = record.compute_fingerprint();
        record
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (catalog, _) = recording_catalog().await;
        let key = catalog
            .create_record(RecordFields::titled("Foo"), RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();
        let db = catalog.db();

        assert_eq!(db.store_cached_record(sample(key)).await.unwrap(), StoreOutcome::Written);
        let stored = db.get_cached_record(key).await.unwrap().unwrap();
        assert_eq!(stored, sample(key));
    }

    #[tokio::test]
    async fn test_identical_content_is_not_rewritten() {
        let (catalog, _) = recording_catalog().await;
        let key = catalog
            .create_record(RecordFields::titled("Foo"), RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();
        let db = catalog.db();
        db.store_cached_record(sample(key)).await.unwrap();

        let again = CachedRecord { refreshed_at: "2030-01-01T00:00:00+00:00".into(), ..sample(key) };
        assert_eq!(db.store_cached_record(again).await.unwrap(), StoreOutcome::Unchanged);
        let stored = db.get_cached_record(key).await.unwrap().unwrap();
        assert_eq!(stored.refreshed_at, "2021-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_missing_source_is_not_resurrected() {
        let (catalog, _) = recording_catalog().await;
        let db = catalog.db();
        let key = RecordKey::new(SourceKind::Patent, 42);

        assert_eq!(db.store_cached_record(sample(key)).await.unwrap(), StoreOutcome::SourceGone);
        assert!(db.get_cached_record(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_orphans() {
        let (catalog, _) = recording_catalog().await;
        let key = catalog
            .create_record(RecordFields::titled("Foo"), RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();
        let db = catalog.db();
        db.store_cached_record(sample(key)).await.unwrap();

        db.conn
            .call(move |conn| conn.execute("DELETE FROM patents WHERE id = ?1", params![key.id]))
            .await
            .unwrap();

        assert_eq!(db.purge_orphaned_records().await.unwrap(), 1);
        assert_eq!(db.cached_record_count().await.unwrap(), 0);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let key = RecordKey::new(SourceKind::Patent, 1);
        let a = sample(key);
        let b = CachedRecord { description: "Bar. 2021.".into(), ..sample(key) };
        let c = CachedRecord { refreshed_at: "later".into(), ..sample(key) };
        assert_ne!(a.compute_fingerprint(), b.compute_fingerprint());
        assert_eq!(a.compute_fingerprint(), c.compute_fingerprint());
    }
}
