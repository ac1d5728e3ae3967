//! Change-event router.
//!
//! Classification is a pure function from one event to the work it implies.
//! Dispatch turns that work into scheduler requests, plus the two cheap
//! inline steps (eviction and owner/referencing lookups) that need the store.

use async_trait::async_trait;

use crate::events::{CACHE_OUTPUT_FIELDS, ChangeEvent, ChangeKind, EventSink};
use crate::key::{RecordKey, SourceKind};
use crate::service::RecordCache;
use crate::Error;

/// Work implied by one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Recompute a record known to exist at event time.
    Recompute { key: RecordKey, description_only: bool },
    /// Recompute the owner of an author link, if it still exists.
    RecomputeOwner(RecordKey),
    /// Recompute every continuous publication that currently references a source.
    RecomputeReferencing { source_id: i64 },
    /// Debounced rebuild of the author index.
    RefreshAuthorIndex,
    /// Remove the cached row and any pending recompute of it.
    Evict(RecordKey),
}

/// Whether an update touched only fields the cache writes itself.
fn only_cache_output(changed_fields: &Option<Vec<String>>) -> bool {
    match changed_fields {
        Some(fields) if !fields.is_empty() => fields.iter().all(|f| CACHE_OUTPUT_FIELDS.contains(&f.as_str())),
        _ => false,
    }
}

/// Map one change event to the actions it requires.
pub fn classify(event: &ChangeEvent) -> Vec<Action> {
    match event {
        ChangeEvent::Record { change: ChangeKind::Deleted, key, .. } => {
            vec![Action::Evict(*key), Action::RefreshAuthorIndex]
        }
        ChangeEvent::Record { key, changed_fields, .. } => {
            if only_cache_output(changed_fields) {
                return Vec::new();
            }
            let mut actions = vec![Action::Recompute { key: *key, description_only: false }];
            if key.kind.is_thesis() {
                actions.push(Action::RefreshAuthorIndex);
            }
            actions
        }
        ChangeEvent::AuthorLink { link, .. } => vec![Action::RecomputeOwner(link.record), Action::RefreshAuthorIndex],
        ChangeEvent::Lookup { change: ChangeKind::Deleted, .. } => vec![Action::RefreshAuthorIndex],
        ChangeEvent::Lookup { .. } => Vec::new(),
        ChangeEvent::Source { change: ChangeKind::Created, .. } => Vec::new(),
        ChangeEvent::Source { change: ChangeKind::Updated, id, previous_name, name, .. } => {
            if previous_name.as_deref() == Some(name.as_str()) {
                Vec::new()
            } else {
                vec![Action::RecomputeReferencing { source_id: *id }]
            }
        }
        ChangeEvent::Source { change: ChangeKind::Deleted, referencing, .. } => referencing
            .iter()
            .map(|id| Action::Recompute {
                key: RecordKey::new(SourceKind::ContinuousPublication, *id),
                description_only: false,
            })
            .collect(),
    }
}

impl RecordCache {
    /// Route one event. Events arriving while the cache is disabled are dropped.
    pub async fn route(&self, event: &ChangeEvent) -> Result<(), Error> {
        if !self.is_enabled() {
            tracing::debug!(?event, "record cache disabled, dropping event");
            return Ok(());
        }

        for action in classify(event) {
            self.dispatch(action).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, action: Action) -> Result<(), Error> {
        match action {
            Action::Recompute { key, description_only } => self.request_recompute(key, description_only),
            Action::RecomputeOwner(key) => {
                if self.db().source_record_exists(key).await? {
                    self.request_recompute(key, true);
                } else {
                    tracing::debug!(key = %key, "owner of author link gone, dropping event");
                }
            }
            Action::RecomputeReferencing { source_id } => {
                let keys = self.db().records_referencing_source(source_id).await?;
                tracing::debug!(source_id, records = keys.len(), "source renamed, recomputing referencing records");
                for key in keys {
                    self.request_recompute(key, true);
                }
            }
            Action::RefreshAuthorIndex => self.request_index_refresh(),
            Action::Evict(key) => {
                self.cancel_recompute(key);
                if self.db().evict_cached_record(key).await? {
                    tracing::debug!(key = %key, "cached record evicted");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for RecordCache {
    async fn publish(&self, event: ChangeEvent) {
        if let Err(e) = self.route(&event).await {
            tracing::warn!(error = %e, ?event, "failed to route change event");
        }
    }
}
