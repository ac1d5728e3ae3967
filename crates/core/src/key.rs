//! Identity resolution for cached records.
//!
//! The five source kinds each live in their own table with their own id
//! sequence, so no single column identifies a record across kinds. Every
//! record is addressed by the composite [`RecordKey`] `(source_kind, local_id)`
//! instead, rendered as `"<kind>:<id>"` wherever a string is needed.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// The five kinds of source record mirrored by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ContinuousPublication,
    BoundPublication,
    DoctoralThesis,
    HabilitationThesis,
    Patent,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::ContinuousPublication,
        SourceKind::BoundPublication,
        SourceKind::DoctoralThesis,
        SourceKind::HabilitationThesis,
        SourceKind::Patent,
    ];

    /// Stable name used in keys and in the `source_kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::ContinuousPublication => "continuous_publication",
            SourceKind::BoundPublication => "bound_publication",
            SourceKind::DoctoralThesis => "doctoral_thesis",
            SourceKind::HabilitationThesis => "habilitation_thesis",
            SourceKind::Patent => "patent",
        }
    }

    /// Table holding the source rows of this kind.
    pub fn table(self) -> &'static str {
        match self {
            SourceKind::ContinuousPublication => "continuous_publications",
            SourceKind::BoundPublication => "bound_publications",
            SourceKind::DoctoralThesis => "doctoral_theses",
            SourceKind::HabilitationThesis => "habilitation_theses",
            SourceKind::Patent => "patents",
        }
    }

    /// Link table associating authors with records of this kind, if any.
    ///
    /// Theses carry their single author on the record itself.
    pub fn link_kind(self) -> Option<AuthorLinkKind> {
        match self {
            SourceKind::ContinuousPublication => Some(AuthorLinkKind::ContinuousPublicationAuthor),
            SourceKind::BoundPublication => Some(AuthorLinkKind::BoundPublicationAuthor),
            SourceKind::Patent => Some(AuthorLinkKind::PatentAuthor),
            SourceKind::DoctoralThesis | SourceKind::HabilitationThesis => None,
        }
    }

    pub fn is_thesis(self) -> bool {
        matches!(self, SourceKind::DoctoralThesis | SourceKind::HabilitationThesis)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidKey(format!("unknown source kind: {s}")))
    }
}

/// Composite key of a source record and of its cached projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct RecordKey {
    pub kind: SourceKind,
    pub id: i64,
}

impl RecordKey {
    pub fn new(kind: SourceKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for RecordKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::InvalidKey(format!("expected <kind>:<id>, got {s:?}")))?;
        let kind = kind.parse()?;
        let id = id
            .parse()
            .map_err(|_| Error::InvalidKey(format!("record id must be an integer, got {id:?}")))?;
        Ok(Self { kind, id })
    }
}

/// The three author-association kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthorLinkKind {
    ContinuousPublicationAuthor,
    BoundPublicationAuthor,
    PatentAuthor,
}

impl AuthorLinkKind {
    pub const ALL: [AuthorLinkKind; 3] = [
        AuthorLinkKind::ContinuousPublicationAuthor,
        AuthorLinkKind::BoundPublicationAuthor,
        AuthorLinkKind::PatentAuthor,
    ];

    /// Kind of the record that owns links of this kind.
    pub fn owner_kind(self) -> SourceKind {
        match self {
            AuthorLinkKind::ContinuousPublicationAuthor => SourceKind::ContinuousPublication,
            AuthorLinkKind::BoundPublicationAuthor => SourceKind::BoundPublication,
            AuthorLinkKind::PatentAuthor => SourceKind::Patent,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            AuthorLinkKind::ContinuousPublicationAuthor => "continuous_publication_authors",
            AuthorLinkKind::BoundPublicationAuthor => "bound_publication_authors",
            AuthorLinkKind::PatentAuthor => "patent_authors",
        }
    }
}

/// Shared lookup entities referenced by source records and author links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    FormalType,
    Language,
    ResponsibilityType,
}

impl LookupKind {
    pub fn table(self) -> &'static str {
        match self {
            LookupKind::FormalType => "formal_types",
            LookupKind::Language => "languages",
            LookupKind::ResponsibilityType => "responsibility_types",
        }
    }
}
