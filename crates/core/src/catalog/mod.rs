//! Source-side entities and the external mutation path.
//!
//! The bibliography itself (publications, theses, patents, their author links
//! and shared lookups) belongs to the business layer. This module gives that
//! layer a minimal persistence API whose every committed write is followed by a
//! [`ChangeEvent`] published to an [`EventSink`]. The cache writes its own
//! tables through a separate crate-private path that never publishes.
//!
//! Read helpers used by the description builder are implemented on
//! [`CacheDb`] alongside the mutations they mirror.

mod links;
mod lookups;
mod records;

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

use crate::cache::CacheDb;
use crate::events::{ChangeEvent, EventSink};
use crate::key::{RecordKey, SourceKind};
use crate::Error;

pub use links::{AuthorLinkChanges, LinkedAuthor, NewAuthorLink};
pub use lookups::SourceChanges;
pub(crate) use records::source_exists;

/// Scalar fields shared by every source kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordFields {
    pub original_title: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub formal_type_id: Option<i64>,
    pub language_id: Option<i64>,
    pub impact_factor: f64,
    pub points: f64,
    pub index_copernicus: f64,
    pub annotation: String,
}

impl RecordFields {
    /// Fields with only the original title set.
    pub fn titled(original_title: impl Into<String>) -> Self {
        Self { original_title: original_title.into(), ..Default::default() }
    }
}

/// Kind-specific part of a source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordDetail {
    ContinuousPublication { source_id: Option<i64> },
    BoundPublication { publisher: Option<String>, isbn: Option<String> },
    DoctoralThesis { author_id: i64, unit_id: Option<i64>, publisher: Option<String> },
    HabilitationThesis { author_id: i64, unit_id: Option<i64>, publisher: Option<String> },
    Patent { patent_number: Option<String> },
}

impl RecordDetail {
    pub fn kind(&self) -> SourceKind {
        match self {
            RecordDetail::ContinuousPublication { .. } => SourceKind::ContinuousPublication,
            RecordDetail::BoundPublication { .. } => SourceKind::BoundPublication,
            RecordDetail::DoctoralThesis { .. } => SourceKind::DoctoralThesis,
            RecordDetail::HabilitationThesis { .. } => SourceKind::HabilitationThesis,
            RecordDetail::Patent { .. } => SourceKind::Patent,
        }
    }

    pub fn source_id(&self) -> Option<i64> {
        match self {
            RecordDetail::ContinuousPublication { source_id } => *source_id,
            _ => None,
        }
    }

    pub fn publisher(&self) -> Option<&str> {
        match self {
            RecordDetail::BoundPublication { publisher, .. }
            | RecordDetail::DoctoralThesis { publisher, .. }
            | RecordDetail::HabilitationThesis { publisher, .. } => publisher.as_deref(),
            _ => None,
        }
    }
}

/// A source record as loaded for description building, with its lookups resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub key: RecordKey,
    pub fields: RecordFields,
    pub detail: RecordDetail,
    pub modified_at: String,
    /// Abbreviation of the formal type.
    pub formal_type: Option<String>,
    /// Abbreviation of the language.
    pub language: Option<String>,
    /// Display name of the journal/source (continuous publications only).
    pub source_name: Option<String>,
}

/// Mutation API for source-side entities.
///
/// Every successful write publishes exactly one event after it commits.
#[derive(Clone)]
pub struct Catalog {
    db: CacheDb,
    events: Arc<dyn EventSink>,
}

impl Catalog {
    pub fn new(db: CacheDb, events: Arc<dyn EventSink>) -> Self {
        Self { db, events }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    async fn emit(&self, event: ChangeEvent) {
        self.events.publish(event).await;
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Turn constraint violations into input errors; everything else stays a database error.
fn constraint_error(err: rusqlite::Error, what: &str) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Error::InvalidInput(format!("{what}: {}", msg.as_deref().unwrap_or("constraint violation")))
        }
        _ => err.into(),
    }
}
