//! Read queries over cached records, filtered through the author index.
//!
//! Results reflect the author index as of its last refresh, so they may lag
//! link edits by up to the index debounce delay.

use tokio_rusqlite::rusqlite::{params_from_iter, types::Value};

use super::records::{SELECT_COLUMNS, cached_from_row};
use super::{CacheDb, CachedRecord, Error};
use crate::key::LookupKind;

/// Upper bound on search results.
pub const MAX_SEARCH_LIMIT: usize = 500;

const ORDER: &str = "ORDER BY c.sort_title, c.source_kind, c.local_id";

/// Records having at least one index row matching `filter`.
///
/// `filter` may refer to `ai` (author_index) and `u` (the row's unit).
fn indexed_sql(filter: &str) -> String {
    format!(
        "SELECT {SELECT_COLUMNS} FROM cached_records c
         WHERE EXISTS (
             SELECT 1 FROM author_index ai
             LEFT JOIN units u ON u.id = ai.unit_id
             WHERE ai.source_kind = c.source_kind AND ai.local_id = c.local_id AND {filter}
         )
         {ORDER}"
    )
}

fn escape_like(token: &str) -> String {
    token.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl CacheDb {
    async fn query_indexed(&self, filter: &'static str, values: Vec<Value>) -> Result<Vec<CachedRecord>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<CachedRecord>, Error> {
                let mut stmt = conn.prepare(&indexed_sql(filter))?;
                let rows = stmt.query_map(params_from_iter(values.iter()), cached_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    async fn responsibility_id(&self, abbreviation: &str) -> Result<i64, Error> {
        self.lookup_id(LookupKind::ResponsibilityType, abbreviation)
            .await?
            .ok_or_else(|| Error::NotFound(format!("responsibility type {abbreviation:?}")))
    }

    /// Every record the author is associated with, in any role.
    pub async fn papers_by_author(&self, author_id: i64) -> Result<Vec<CachedRecord>, Error> {
        self.query_indexed("ai.author_id = ?1", vec![Value::Integer(author_id)]).await
    }

    /// Every record with an author in the unit, optionally restricted by affiliation.
    pub async fn papers_by_unit(&self, unit_id: i64, affiliated: Option<bool>) -> Result<Vec<CachedRecord>, Error> {
        match affiliated {
            None => self.query_indexed("ai.unit_id = ?1", vec![Value::Integer(unit_id)]).await,
            Some(flag) => {
                self.query_indexed(
                    "ai.unit_id = ?1 AND ai.affiliated = ?2",
                    vec![Value::Integer(unit_id), Value::Integer(flag as i64)],
                )
                .await
            }
        }
    }

    /// Records the author is associated with in a given role (by abbreviation, e.g. `"red."`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no responsibility type has that abbreviation.
    pub async fn papers_by_author_and_role(&self, author_id: i64, role: &str) -> Result<Vec<CachedRecord>, Error> {
        let role_id = self.responsibility_id(role).await?;
        self.query_indexed(
            "ai.author_id = ?1 AND ai.responsibility_type_id = ?2",
            vec![Value::Integer(author_id), Value::Integer(role_id)],
        )
        .await
    }

    /// Records with an author from the unit acting in a given role.
    pub async fn papers_by_unit_and_role(&self, unit_id: i64, role: &str) -> Result<Vec<CachedRecord>, Error> {
        let role_id = self.responsibility_id(role).await?;
        self.query_indexed(
            "ai.unit_id = ?1 AND ai.responsibility_type_id = ?2",
            vec![Value::Integer(unit_id), Value::Integer(role_id)],
        )
        .await
    }

    /// Records the author signed as affiliated with a unit that employs staff.
    pub async fn papers_by_author_affiliated(&self, author_id: i64) -> Result<Vec<CachedRecord>, Error> {
        self.query_indexed(
            "ai.author_id = ?1 AND ai.affiliated = 1 AND u.employs_staff = 1",
            vec![Value::Integer(author_id)],
        )
        .await
    }

    /// Records whose search tokens start with every word of `text`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `text` has no searchable words.
    pub async fn search_records(&self, text: &str, limit: usize) -> Result<Vec<CachedRecord>, Error> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| format!("% {}%", escape_like(&t.to_lowercase())))
            .collect();
        if tokens.is_empty() {
            return Err(Error::InvalidInput("search text has no words".into()));
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);

        self.conn
            .call(move |conn| -> Result<Vec<CachedRecord>, Error> {
                let conditions: Vec<String> = (1..=tokens.len())
                    .map(|i| format!("(' ' || c.search_index) LIKE ?{i} ESCAPE '\\'"))
                    .collect();
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM cached_records c WHERE {} {ORDER} LIMIT {limit}",
                    conditions.join(" AND ")
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(tokens.iter()), cached_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }
}
