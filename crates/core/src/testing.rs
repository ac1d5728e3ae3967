//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CacheDb;
use crate::catalog::Catalog;
use crate::describe::PlainRenderer;
use crate::events::{ChangeEvent, EventSink};
use crate::key::LookupKind;
use crate::service::{CacheSettings, RecordCache};

/// Sink that remembers every event it was handed.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: ChangeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Catalog over a fresh in-memory database whose events are only recorded.
pub async fn recording_catalog() -> (Catalog, Arc<RecordingSink>) {
    let db = CacheDb::open_in_memory().await.unwrap();
    let sink = Arc::new(RecordingSink::default());
    (Catalog::new(db, sink.clone()), sink)
}

/// Settings with no record delay and a short index delay.
pub fn test_settings() -> CacheSettings {
    CacheSettings { record_delay: Duration::ZERO, index_delay: Duration::from_millis(50), rebuild_workers: 2 }
}

/// Enabled cache and a catalog that routes its events into it.
pub async fn wired() -> (RecordCache, Catalog) {
    wired_with(test_settings()).await
}

/// [`wired`] with explicit settings.
pub async fn wired_with(settings: CacheSettings) -> (RecordCache, Catalog) {
    let db = CacheDb::open_in_memory().await.unwrap();
    let cache = RecordCache::new(db.clone(), Arc::new(PlainRenderer), settings);
    cache.enable().unwrap();
    let catalog = Catalog::new(db, Arc::new(cache.clone()));
    (cache, catalog)
}

/// Ids of the lookup rows most tests need.
pub struct Lookups {
    pub kowalski: i64,
    pub unit: i64,
    pub author_role: i64,
    pub editor_role: i64,
}

impl Lookups {
    pub async fn seed(catalog: &Catalog) -> Self {
        Self {
            kowalski: catalog.create_author("Kowalski", "Jan").await.unwrap(),
            unit: catalog.create_unit("Department of Chemistry", true).await.unwrap(),
            author_role: catalog.create_lookup(LookupKind::ResponsibilityType, "author", "aut.").await.unwrap(),
            editor_role: catalog.create_lookup(LookupKind::ResponsibilityType, "editor", "red.").await.unwrap(),
        }
    }
}
