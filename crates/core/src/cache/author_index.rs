//! Secondary author index, rebuilt in bulk.
//!
//! One row per (author, record) association across the three link tables,
//! plus one row per thesis for its inline author. Queries filter cached
//! records by author or unit through this table.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::params;

use super::{CacheDb, Error};
use crate::key::{AuthorLinkKind, RecordKey, SourceKind};

/// One author association as seen by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuthorIndexEntry {
    pub author_id: i64,
    pub key: RecordKey,
    pub unit_id: Option<i64>,
    /// `None` for thesis authors, who have no responsibility type.
    pub responsibility_type_id: Option<i64>,
    pub ordinal: i64,
    pub recorded_as: String,
    pub affiliated: bool,
}

fn rebuild_sql() -> String {
    let links = AuthorLinkKind::ALL.iter().map(|link| {
        format!(
            "SELECT author_id, '{kind}', record_id, unit_id, responsibility_type_id, ordinal, recorded_as, affiliated
             FROM {table}",
            kind = link.owner_kind().as_str(),
            table = link.table()
        )
    });
    let theses = [SourceKind::DoctoralThesis, SourceKind::HabilitationThesis].into_iter().map(|kind| {
        format!(
            "SELECT t.author_id, '{kind}', t.id, t.unit_id, NULL, 0, a.surname || ' ' || a.first_names, 1
             FROM {table} t JOIN authors a ON a.id = t.author_id",
            kind = kind.as_str(),
            table = kind.table()
        )
    });

    let selects: Vec<String> = links.chain(theses).collect();
    format!(
        "INSERT INTO author_index
            (author_id, source_kind, local_id, unit_id, responsibility_type_id, ordinal, recorded_as, affiliated)
         {}",
        selects.join("\n UNION ALL\n ")
    )
}

impl CacheDb {
    /// Replace the whole author index with the current association set.
    ///
    /// Runs in one transaction; readers see either the old or the new index.
    /// Returns the number of rows written.
    pub async fn refresh_author_index(&self) -> Result<u64, Error> {
        let count = self
            .conn
            .call(|conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM author_index", [])?;
                let inserted = tx.execute(&rebuild_sql(), [])?;
                tx.commit()?;
                Ok(inserted as u64)
            })
            .await
            .map_err(Error::from)?;

        tracing::info!(rows = count, "author index refreshed");
        Ok(count)
    }

    /// Index rows for one author, ordered by record key.
    pub async fn author_index_entries(&self, author_id: i64) -> Result<Vec<AuthorIndexEntry>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<AuthorIndexEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT author_id, source_kind, local_id, unit_id, responsibility_type_id, ordinal, recorded_as,
                            affiliated
                     FROM author_index
                     WHERE author_id = ?1
                     ORDER BY source_kind, local_id, ordinal",
                )?;
                let rows = stmt.query_map(params![author_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i32>(7)?,
                    ))
                })?;

                let mut entries = Vec::new();
                for row in rows {
                    let (author_id, kind, local_id, unit_id, responsibility_type_id, ordinal, recorded_as, affiliated) =
                        row?;
                    entries.push(AuthorIndexEntry {
                        author_id,
                        key: RecordKey::new(kind.parse()?, local_id),
                        unit_id,
                        responsibility_type_id,
                        ordinal,
                        recorded_as,
                        affiliated: affiliated == 1,
                    });
                }
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn author_index_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM author_index", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
