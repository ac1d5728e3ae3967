//! Authors, units, journals and the small lookup tables.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::{OptionalExtension, params};

use super::records::referencing_ids;
use super::{Catalog, constraint_error};
use crate::cache::CacheDb;
use crate::events::{ChangeEvent, ChangeKind};
use crate::key::LookupKind;
use crate::Error;

/// Partial update of a journal/source. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceChanges {
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub note: Option<String>,
}

impl CacheDb {
    /// Id of a lookup row by its abbreviation.
    pub async fn lookup_id(&self, kind: LookupKind, abbreviation: &str) -> Result<Option<i64>, Error> {
        let abbreviation = abbreviation.to_string();
        self.conn
            .call(move |conn| -> Result<Option<i64>, Error> {
                let id = conn
                    .query_row(
                        &format!("SELECT id FROM {} WHERE abbreviation = ?1", kind.table()),
                        params![abbreviation],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(id)
            })
            .await
            .map_err(Error::from)
    }
}

impl Catalog {
    /// Register an author. Author renames are not observed by the cache.
    pub async fn create_author(&self, surname: &str, first_names: &str) -> Result<i64, Error> {
        let (surname, first_names) = (surname.to_string(), first_names.to_string());
        self.db
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute("INSERT INTO authors (surname, first_names) VALUES (?1, ?2)", params![surname, first_names])?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Register an organizational unit.
    pub async fn create_unit(&self, name: &str, employs_staff: bool) -> Result<i64, Error> {
        let name = name.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute("INSERT INTO units (name, employs_staff) VALUES (?1, ?2)", params![name, employs_staff as i32])?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Create a formal type, language or responsibility type.
    pub async fn create_lookup(&self, kind: LookupKind, name: &str, abbreviation: &str) -> Result<i64, Error> {
        let (name, abbreviation) = (name.to_string(), abbreviation.to_string());
        let id = self
            .db
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    &format!("INSERT INTO {} (name, abbreviation) VALUES (?1, ?2)", kind.table()),
                    params![name, abbreviation],
                )
                .map_err(|e| constraint_error(e, "cannot create lookup"))?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Lookup { change: ChangeKind::Created, kind, id }).await;
        Ok(id)
    }

    /// Delete a lookup row.
    ///
    /// Records pointing at a deleted formal type or language lose the
    /// reference; link rows pointing at a responsibility type block the delete.
    pub async fn delete_lookup(&self, kind: LookupKind, id: i64) -> Result<(), Error> {
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let deleted = conn
                    .execute(&format!("DELETE FROM {} WHERE id = ?1", kind.table()), params![id])
                    .map_err(|e| constraint_error(e, "lookup still referenced"))?;
                if deleted == 0 {
                    return Err(Error::NotFound(format!("{} {id}", kind.table())));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Lookup { change: ChangeKind::Deleted, kind, id }).await;
        Ok(())
    }

    /// Create a journal/source.
    pub async fn create_source(&self, name: &str, abbreviation: Option<String>) -> Result<i64, Error> {
        let name = name.to_string();
        let stored_name = name.clone();
        let id = self
            .db
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute("INSERT INTO sources (name, abbreviation) VALUES (?1, ?2)", params![stored_name, abbreviation])?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Source {
            change: ChangeKind::Created,
            id,
            previous_name: None,
            name,
            referencing: Vec::new(),
        })
        .await;
        Ok(id)
    }

    /// Update a journal/source.
    ///
    /// The persisted name is read in the same call as the write so the event
    /// can tell subscribers whether the display name actually changed.
    pub async fn update_source(&self, id: i64, changes: SourceChanges) -> Result<(), Error> {
        let (previous_name, name) = self
            .db
            .conn
            .call(move |conn| -> Result<(String, String), Error> {
                let tx = conn.transaction()?;
                let previous: String = tx
                    .query_row("SELECT name FROM sources WHERE id = ?1", params![id], |row| row.get(0))
                    .optional()?
                    .ok_or_else(|| Error::NotFound(format!("source {id}")))?;
                tx.execute(
                    "UPDATE sources SET
                        name = COALESCE(?1, name),
                        abbreviation = COALESCE(?2, abbreviation),
                        note = COALESCE(?3, note)
                     WHERE id = ?4",
                    params![changes.name, changes.abbreviation, changes.note, id],
                )?;
                let current: String = tx.query_row("SELECT name FROM sources WHERE id = ?1", params![id], |row| row.get(0))?;
                tx.commit()?;
                Ok((previous, current))
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Source {
            change: ChangeKind::Updated,
            id,
            previous_name: Some(previous_name),
            name,
            referencing: Vec::new(),
        })
        .await;
        Ok(())
    }

    /// Delete a journal/source. Referencing records keep existing with no source.
    pub async fn delete_source(&self, id: i64) -> Result<(), Error> {
        let (name, referencing) = self
            .db
            .conn
            .call(move |conn| -> Result<(String, Vec<i64>), Error> {
                let tx = conn.transaction()?;
                let name: String = tx
                    .query_row("SELECT name FROM sources WHERE id = ?1", params![id], |row| row.get(0))
                    .optional()?
                    .ok_or_else(|| Error::NotFound(format!("source {id}")))?;
                let referencing = referencing_ids(&tx, id)?;
                tx.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok((name, referencing))
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::Source {
            change: ChangeKind::Deleted,
            id,
            previous_name: Some(name.clone()),
            name,
            referencing,
        })
        .await;
        Ok(())
    }
}
