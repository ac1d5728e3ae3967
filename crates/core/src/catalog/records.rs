//! Source record persistence for the five kinds.

use tokio_rusqlite::rusqlite::{self, OptionalExtension, params, params_from_iter, types::Value};

use super::{Catalog, RecordDetail, RecordFields, SourceRecord, constraint_error, now_rfc3339};
use crate::cache::CacheDb;
use crate::events::{ChangeEvent, ChangeKind};
use crate::key::{RecordKey, SourceKind};
use crate::Error;

const COMMON_COLUMNS: [&str; 10] = [
    "original_title",
    "title",
    "year",
    "formal_type_id",
    "language_id",
    "impact_factor",
    "points",
    "index_copernicus",
    "annotation",
    "modified_at",
];

fn detail_columns(kind: SourceKind) -> &'static [&'static str] {
    match kind {
        SourceKind::ContinuousPublication => &["source_id"],
        SourceKind::BoundPublication => &["publisher", "isbn"],
        SourceKind::DoctoralThesis | SourceKind::HabilitationThesis => &["author_id", "unit_id", "publisher"],
        SourceKind::Patent => &["patent_number"],
    }
}

fn opt_text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn opt_int(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

/// Column values in `COMMON_COLUMNS` order followed by `detail_columns` order.
fn row_values(fields: &RecordFields, detail: &RecordDetail, modified_at: &str) -> Vec<Value> {
    let mut values = vec![
        Value::Text(fields.original_title.clone()),
        opt_text(&fields.title),
        opt_int(fields.year.map(i64::from)),
        opt_int(fields.formal_type_id),
        opt_int(fields.language_id),
        Value::Real(fields.impact_factor),
        Value::Real(fields.points),
        Value::Real(fields.index_copernicus),
        Value::Text(fields.annotation.clone()),
        Value::Text(modified_at.to_string()),
    ];

    match detail {
        RecordDetail::ContinuousPublication { source_id } => values.push(opt_int(*source_id)),
        RecordDetail::BoundPublication { publisher, isbn } => {
            values.push(opt_text(publisher));
            values.push(opt_text(isbn));
        }
        RecordDetail::DoctoralThesis { author_id, unit_id, publisher }
        | RecordDetail::HabilitationThesis { author_id, unit_id, publisher } => {
            values.push(Value::Integer(*author_id));
            values.push(opt_int(*unit_id));
            values.push(opt_text(publisher));
        }
        RecordDetail::Patent { patent_number } => values.push(opt_text(patent_number)),
    }

    values
}

fn select_sql(kind: SourceKind) -> String {
    let (extra_columns, extra_join) = match kind {
        SourceKind::ContinuousPublication => ("r.source_id, s.name", "LEFT JOIN sources s ON s.id = r.source_id"),
        SourceKind::BoundPublication => ("r.publisher, r.isbn", ""),
        SourceKind::DoctoralThesis | SourceKind::HabilitationThesis => ("r.author_id, r.unit_id, r.publisher", ""),
        SourceKind::Patent => ("r.patent_number", ""),
    };

    format!(
        "SELECT r.id, r.original_title, r.title, r.year, r.formal_type_id, r.language_id,
                r.impact_factor, r.points, r.index_copernicus, r.annotation, r.modified_at,
                ft.abbreviation, lang.abbreviation, {extra_columns}
         FROM {table} r
         LEFT JOIN formal_types ft ON ft.id = r.formal_type_id
         LEFT JOIN languages lang ON lang.id = r.language_id
         {extra_join}
         WHERE r.id = ?1",
        table = kind.table(),
    )
}

fn record_from_row(kind: SourceKind, row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRecord> {
    let fields = RecordFields {
        original_title: row.get(1)?,
        title: row.get(2)?,
        year: row.get(3)?,
        formal_type_id: row.get(4)?,
        language_id: row.get(5)?,
        impact_factor: row.get(6)?,
        points: row.get(7)?,
        index_copernicus: row.get(8)?,
        annotation: row.get(9)?,
    };

    let mut source_name = None;
    let detail = match kind {
        SourceKind::ContinuousPublication => {
            source_name = row.get(14)?;
            RecordDetail::ContinuousPublication { source_id: row.get(13)? }
        }
        SourceKind::BoundPublication => RecordDetail::BoundPublication { publisher: row.get(13)?, isbn: row.get(14)? },
        SourceKind::DoctoralThesis => {
            RecordDetail::DoctoralThesis { author_id: row.get(13)?, unit_id: row.get(14)?, publisher: row.get(15)? }
        }
        SourceKind::HabilitationThesis => {
            RecordDetail::HabilitationThesis { author_id: row.get(13)?, unit_id: row.get(14)?, publisher: row.get(15)? }
        }
        SourceKind::Patent => RecordDetail::Patent { patent_number: row.get(13)? },
    };

    Ok(SourceRecord {
        key: RecordKey::new(kind, row.get(0)?),
        fields,
        detail,
        modified_at: row.get(10)?,
        formal_type: row.get(11)?,
        language: row.get(12)?,
        source_name,
    })
}

impl CacheDb {
    /// Load a source record with its lookups resolved.
    ///
    /// Returns None if the record doesn't exist (e.g., it was deleted after a
    /// recompute was scheduled).
    pub async fn load_source_record(&self, key: RecordKey) -> Result<Option<SourceRecord>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<SourceRecord>, Error> {
                let mut stmt = conn.prepare(&select_sql(key.kind))?;
                let record = stmt
                    .query_row(params![key.id], |row| record_from_row(key.kind, row))
                    .optional()?;
                Ok(record)
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether the source row behind a key still exists.
    pub async fn source_record_exists(&self, key: RecordKey) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> { Ok(source_exists(conn, key)?) })
            .await
            .map_err(Error::from)
    }

    /// Keys of every source record across all five kinds, in kind then id order.
    pub async fn list_source_keys(&self) -> Result<Vec<RecordKey>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<RecordKey>, Error> {
                let mut keys = Vec::new();
                for kind in SourceKind::ALL {
                    let mut stmt = conn.prepare(&format!("SELECT id FROM {} ORDER BY id", kind.table()))?;
                    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
                    for id in ids {
                        keys.push(RecordKey::new(kind, id?));
                    }
                }
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Continuous publications currently referencing a source.
    pub async fn records_referencing_source(&self, source_id: i64) -> Result<Vec<RecordKey>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<RecordKey>, Error> {
                let ids = referencing_ids(conn, source_id)?;
                Ok(ids
                    .into_iter()
                    .map(|id| RecordKey::new(SourceKind::ContinuousPublication, id))
                    .collect())
            })
            .await
            .map_err(Error::from)
    }
}

pub(crate) fn source_exists(conn: &rusqlite::Connection, key: RecordKey) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", key.kind.table()),
        params![key.id],
        |row| row.get(0),
    )
}

pub(super) fn referencing_ids(conn: &rusqlite::Connection, source_id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM continuous_publications WHERE source_id = ?1 ORDER BY id")?;
    let ids = stmt.query_map(params![source_id], |row| row.get(0))?;
    ids.collect()
}

impl Catalog {
    /// Insert a new source record. The kind is taken from `detail`.
    pub async fn create_record(&self, fields: RecordFields, detail: RecordDetail) -> Result<RecordKey, Error> {
        let kind = detail.kind();
        let key = self
            .db
            .conn
            .call(move |conn| -> Result<RecordKey, Error> {
                let columns: Vec<&str> = COMMON_COLUMNS.iter().chain(detail_columns(kind)).copied().collect();
                let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    kind.table(),
                    columns.join(", "),
                    placeholders.join(", ")
                );
                let values = row_values(&fields, &detail, &now_rfc3339());
                conn.execute(&sql, params_from_iter(values.iter()))
                    .map_err(|e| constraint_error(e, "cannot create record"))?;
                Ok(RecordKey::new(kind, conn.last_insert_rowid()))
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Record { change: ChangeKind::Created, key, changed_fields: None })
            .await;
        Ok(key)
    }

    /// Overwrite every field of an existing record and bump its modification time.
    pub async fn update_record(&self, key: RecordKey, fields: RecordFields, detail: RecordDetail) -> Result<(), Error> {
        if detail.kind() != key.kind {
            return Err(Error::InvalidInput(format!("{} detail cannot be stored under {key}", detail.kind())));
        }

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let assignments: Vec<String> = COMMON_COLUMNS
                    .iter()
                    .chain(detail_columns(key.kind))
                    .enumerate()
                    .map(|(i, column)| format!("{column} = ?{}", i + 1))
                    .collect();
                let mut values = row_values(&fields, &detail, &now_rfc3339());
                values.push(Value::Integer(key.id));
                let sql = format!(
                    "UPDATE {} SET {} WHERE id = ?{}",
                    key.kind.table(),
                    assignments.join(", "),
                    values.len()
                );
                let updated = conn
                    .execute(&sql, params_from_iter(values.iter()))
                    .map_err(|e| constraint_error(e, "cannot update record"))?;
                if updated == 0 {
                    return Err(Error::NotFound(key.to_string()));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Record { change: ChangeKind::Updated, key, changed_fields: None })
            .await;
        Ok(())
    }

    /// Delete a source record. Its author links go with it.
    pub async fn delete_record(&self, key: RecordKey) -> Result<(), Error> {
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let deleted = conn.execute(&format!("DELETE FROM {} WHERE id = ?1", key.kind.table()), params![key.id])?;
                if deleted == 0 {
                    return Err(Error::NotFound(key.to_string()));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Record { change: ChangeKind::Deleted, key, changed_fields: None })
            .await;
        Ok(())
    }
}
