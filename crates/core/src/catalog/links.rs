//! Author links: who wrote a record, in which unit, in what role and order.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::{OptionalExtension, params};

use super::{Catalog, constraint_error};
use crate::cache::CacheDb;
use crate::events::{AuthorLinkRef, ChangeEvent, ChangeKind};
use crate::key::RecordKey;
use crate::Error;

/// Input for a new author link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuthorLink {
    pub author_id: i64,
    pub unit_id: i64,
    pub responsibility_type_id: i64,
    /// Position in the author list; defaults to one past the current last.
    pub ordinal: Option<i64>,
    /// Name as printed on the work; defaults to the author's canonical name.
    pub recorded_as: Option<String>,
    pub affiliated: bool,
}

impl NewAuthorLink {
    pub fn new(author_id: i64, unit_id: i64, responsibility_type_id: i64) -> Self {
        Self { author_id, unit_id, responsibility_type_id, ordinal: None, recorded_as: None, affiliated: true }
    }
}

/// Partial update of an author link. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorLinkChanges {
    pub ordinal: Option<i64>,
    pub recorded_as: Option<String>,
    pub affiliated: Option<bool>,
}

/// An author of a record as seen by the description builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAuthor {
    pub author_id: i64,
    /// `"Surname FirstNames"` as currently stored on the author.
    pub canonical_name: String,
    /// Name recorded on the link when it was made.
    pub recorded_as: String,
    pub unit_id: Option<i64>,
    /// Abbreviation of the responsibility type (e.g. `"aut."`, `"red."`).
    pub responsibility: Option<String>,
    pub ordinal: i64,
    pub affiliated: bool,
}

fn canonical_name(surname: &str, first_names: &str) -> String {
    format!("{surname} {first_names}").trim().to_string()
}

impl CacheDb {
    /// Authors of a record in list order.
    ///
    /// Theses have no link table; their single author is reported with the
    /// canonical name doubling as the recorded name.
    pub async fn load_linked_authors(&self, key: RecordKey) -> Result<Vec<LinkedAuthor>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<LinkedAuthor>, Error> {
                let Some(link_kind) = key.kind.link_kind() else {
                    let sql = format!(
                        "SELECT t.author_id, a.surname, a.first_names, t.unit_id
                         FROM {} t JOIN authors a ON a.id = t.author_id
                         WHERE t.id = ?1",
                        key.kind.table()
                    );
                    let author = conn
                        .query_row(&sql, params![key.id], |row| {
                            let name = canonical_name(&row.get::<_, String>(1)?, &row.get::<_, String>(2)?);
                            Ok(LinkedAuthor {
                                author_id: row.get(0)?,
                                canonical_name: name.clone(),
                                recorded_as: name,
                                unit_id: row.get(3)?,
                                responsibility: None,
                                ordinal: 0,
                                affiliated: true,
                            })
                        })
                        .optional()?;
                    return Ok(author.into_iter().collect());
                };

                let sql = format!(
                    "SELECT l.author_id, a.surname, a.first_names, l.recorded_as, l.unit_id,
                            rt.abbreviation, l.ordinal, l.affiliated
                     FROM {} l
                     JOIN authors a ON a.id = l.author_id
                     LEFT JOIN responsibility_types rt ON rt.id = l.responsibility_type_id
                     WHERE l.record_id = ?1
                     ORDER BY l.ordinal",
                    link_kind.table()
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![key.id], |row| {
                    Ok(LinkedAuthor {
                        author_id: row.get(0)?,
                        canonical_name: canonical_name(&row.get::<_, String>(1)?, &row.get::<_, String>(2)?),
                        recorded_as: row.get(3)?,
                        unit_id: row.get(4)?,
                        responsibility: row.get(5)?,
                        ordinal: row.get(6)?,
                        affiliated: row.get::<_, i32>(7)? == 1,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }
}

impl Catalog {
    /// Link an author to a record of a kind that has a link table.
    pub async fn add_author_link(&self, record: RecordKey, link: NewAuthorLink) -> Result<AuthorLinkRef, Error> {
        let kind = record
            .kind
            .link_kind()
            .ok_or_else(|| Error::InvalidInput(format!("{} records carry their author inline", record.kind)))?;

        let link_ref = self
            .db
            .conn
            .call(move |conn| -> Result<AuthorLinkRef, Error> {
                if !super::records::source_exists(conn, record)? {
                    return Err(Error::NotFound(record.to_string()));
                }

                let ordinal = match link.ordinal {
                    Some(ordinal) => ordinal,
                    None => conn.query_row(
                        &format!("SELECT COALESCE(MAX(ordinal) + 1, 0) FROM {} WHERE record_id = ?1", kind.table()),
                        params![record.id],
                        |row| row.get(0),
                    )?,
                };

                let recorded_as = match link.recorded_as {
                    Some(recorded_as) => recorded_as,
                    None => conn
                        .query_row(
                            "SELECT surname, first_names FROM authors WHERE id = ?1",
                            params![link.author_id],
                            |row| Ok(canonical_name(&row.get::<_, String>(0)?, &row.get::<_, String>(1)?)),
                        )
                        .optional()?
                        .ok_or_else(|| Error::NotFound(format!("author {}", link.author_id)))?,
                };

                conn.execute(
                    &format!(
                        "INSERT INTO {} (record_id, author_id, unit_id, responsibility_type_id, ordinal, recorded_as, affiliated)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        kind.table()
                    ),
                    params![
                        record.id,
                        link.author_id,
                        link.unit_id,
                        link.responsibility_type_id,
                        ordinal,
                        recorded_as,
                        link.affiliated as i32,
                    ],
                )
                .map_err(|e| constraint_error(e, "cannot link author"))?;

                Ok(AuthorLinkRef { kind, id: conn.last_insert_rowid(), record })
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::AuthorLink { change: ChangeKind::Created, link: link_ref })
            .await;
        Ok(link_ref)
    }

    /// Change ordinal, recorded name or affiliation of an existing link.
    pub async fn update_author_link(&self, link: AuthorLinkRef, changes: AuthorLinkChanges) -> Result<(), Error> {
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let updated = conn
                    .execute(
                        &format!(
                            "UPDATE {} SET
                                ordinal = COALESCE(?1, ordinal),
                                recorded_as = COALESCE(?2, recorded_as),
                                affiliated = COALESCE(?3, affiliated)
                             WHERE id = ?4 AND record_id = ?5",
                            link.kind.table()
                        ),
                        params![
                            changes.ordinal,
                            changes.recorded_as,
                            changes.affiliated.map(i32::from),
                            link.id,
                            link.record.id
                        ],
                    )
                    .map_err(|e| constraint_error(e, "cannot update author link"))?;
                if updated == 0 {
                    return Err(Error::NotFound(format!("author link {} of {}", link.id, link.record)));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::AuthorLink { change: ChangeKind::Updated, link }).await;
        Ok(())
    }

    /// Remove an author link.
    pub async fn remove_author_link(&self, link: AuthorLinkRef) -> Result<(), Error> {
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let deleted = conn.execute(
                    &format!("DELETE FROM {} WHERE id = ?1 AND record_id = ?2", link.kind.table()),
                    params![link.id, link.record.id],
                )?;
                if deleted == 0 {
                    return Err(Error::NotFound(format!("author link {} of {}", link.id, link.record)));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        self.emit(ChangeEvent::AuthorLink { change: ChangeKind::Deleted, link }).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RecordDetail, RecordFields};
    use crate::key::{AuthorLinkKind, SourceKind};
    use crate::testing::{Lookups, recording_catalog};

    async fn publication(catalog: &Catalog) -> RecordKey {
        catalog
            .create_record(RecordFields::titled("Foo"), RecordDetail::ContinuousPublication { source_id: None })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_defaults_for_ordinal_and_recorded_name() {
        let (catalog, _) = recording_catalog().await;
        let lookups = Lookups::seed(&catalog).await;
        let record = publication(&catalog).await;
        let nowak = catalog.create_author("Nowak", "Anna").await.unwrap();

        catalog
            .add_author_link(record, NewAuthorLink::new(lookups.kowalski, lookups.unit, lookups.author_role))
            .await
            .unwrap();
        catalog
            .add_author_link(record, NewAuthorLink::new(nowak, lookups.unit, lookups.author_role))
            .await
            .unwrap();

        let authors = catalog.db().load_linked_authors(record).await.unwrap();
        let names: Vec<(&str, i64)> = authors.iter().map(|a| (a.recorded_as.as_str(), a.ordinal)).collect();
        assert_eq!(names, vec![("Kowalski Jan", 0), ("Nowak Anna", 1)]);
        assert_eq!(authors[0].responsibility.as_deref(), Some("aut."));
    }

    #[tokio::test]
    async fn test_duplicate_ordinal_is_rejected() {
        let (catalog, _) = recording_catalog().await;
        let lookups = Lookups::seed(&catalog).await;
        let record = publication(&catalog).await;
        let nowak = catalog.create_author("Nowak", "Anna").await.unwrap();

        let first = NewAuthorLink { ordinal: Some(0), ..NewAuthorLink::new(lookups.kowalski, lookups.unit, lookups.author_role) };
        let second = NewAuthorLink { ordinal: Some(0), ..NewAuthorLink::new(nowak, lookups.unit, lookups.author_role) };
        catalog.add_author_link(record, first).await.unwrap();

        let result = catalog.add_author_link(record, second).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_thesis_has_inline_author() {
        let (catalog, _) = recording_catalog().await;
        let lookups = Lookups::seed(&catalog).await;
        let thesis = catalog
            .create_record(
                RecordFields::titled("On Things"),
                RecordDetail::DoctoralThesis { author_id: lookups.kowalski, unit_id: Some(lookups.unit), publisher: None },
            )
            .await
            .unwrap();

        let authors = catalog.db().load_linked_authors(thesis).await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].recorded_as, "Kowalski Jan");

        let result = catalog
            .add_author_link(thesis, NewAuthorLink::new(lookups.kowalski, lookups.unit, lookups.author_role))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_link_events_carry_owner() {
        let (catalog, sink) = recording_catalog().await;
        let lookups = Lookups::seed(&catalog).await;
        let record = publication(&catalog).await;

        let link = catalog
            .add_author_link(record, NewAuthorLink::new(lookups.kowalski, lookups.unit, lookups.author_role))
            .await
            .unwrap();
        catalog
            .update_author_link(link, AuthorLinkChanges { recorded_as: Some("Kowalski J.".into()), ..Default::default() })
            .await
            .unwrap();
        catalog.remove_author_link(link).await.unwrap();

        let link_events: Vec<ChangeEvent> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, ChangeEvent::AuthorLink { .. }))
            .collect();
        assert_eq!(link_events.len(), 3);
        for event in link_events {
            let ChangeEvent::AuthorLink { link: seen, .. } = event else { unreachable!() };
            assert_eq!(seen.record, record);
            assert_eq!(seen.kind, AuthorLinkKind::ContinuousPublicationAuthor);
        }
    }

    #[tokio::test]
    async fn test_record_delete_cascades_links() {
        let (catalog, _) = recording_catalog().await;
        let lookups = Lookups::seed(&catalog).await;
        let record = catalog
            .create_record(RecordFields::titled("Gadget"), RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();
        catalog
            .add_author_link(record, NewAuthorLink::new(lookups.kowalski, lookups.unit, lookups.author_role))
            .await
            .unwrap();

        catalog.delete_record(record).await.unwrap();

        let remaining = catalog
            .db()
            .conn
            .call(|conn| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", AuthorLinkKind::PatentAuthor.table()), [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(catalog.db().load_linked_authors(RecordKey::new(SourceKind::Patent, record.id)).await.unwrap().is_empty());
    }
}
