//! Change events published by the source-side mutation path.
//!
//! Mutation code calls [`EventSink::publish`] deliberately after each committed
//! write. The cache's own writes never go through here, which is what keeps
//! a recompute from re-triggering itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::key::{AuthorLinkKind, LookupKind, RecordKey};

/// Record fields written by the cache itself.
///
/// An update event whose `changed_fields` contains nothing else is the cache
/// observing its own output and must not schedule a recompute.
pub const CACHE_OUTPUT_FIELDS: &[&str] = &["description", "author_list", "recorded_authors"];

/// Lifecycle stage of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Identity of one author link together with the record that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorLinkRef {
    pub kind: AuthorLinkKind,
    pub id: i64,
    pub record: RecordKey,
}

/// A committed change to an entity the cache depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// One of the five source record kinds.
    Record {
        change: ChangeKind,
        key: RecordKey,
        /// Fields touched by an update, when the writer knows them.
        changed_fields: Option<Vec<String>>,
    },

    /// A row in one of the three author-link tables.
    AuthorLink { change: ChangeKind, link: AuthorLinkRef },

    /// A formal type, language or responsibility type.
    Lookup { change: ChangeKind, kind: LookupKind, id: i64 },

    /// A journal/source entity.
    Source {
        change: ChangeKind,
        id: i64,
        /// Name persisted before the write; `None` on creation.
        previous_name: Option<String>,
        name: String,
        /// Continuous publications that referenced the source before it was deleted.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        referencing: Vec<i64>,
    },
}

impl ChangeEvent {
    pub fn change(&self) -> ChangeKind {
        match self {
            ChangeEvent::Record { change, .. }
            | ChangeEvent::AuthorLink { change, .. }
            | ChangeEvent::Lookup { change, .. }
            | ChangeEvent::Source { change, .. } => *change,
        }
    }
}

/// Receiver of change events.
///
/// Publishing never fails from the caller's point of view: the mutation has
/// already committed, so routing problems are logged by the sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ChangeEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SourceKind;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ChangeEvent::Record {
            change: ChangeKind::Updated,
            key: RecordKey::new(SourceKind::Patent, 3),
            changed_fields: Some(vec!["points".into()]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["entity"], "record");
        assert_eq!(json["change"], "updated");
        assert_eq!(json["key"]["kind"], "patent");
    }

    #[test]
    fn test_change_accessor() {
        let event = ChangeEvent::Lookup { change: ChangeKind::Deleted, kind: LookupKind::Language, id: 1 };
        assert_eq!(event.change(), ChangeKind::Deleted);
    }
}
