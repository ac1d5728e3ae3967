//! The record cache service object.
//!
//! [`RecordCache`] owns everything the maintenance protocol needs: the
//! database handle, the description renderer, the enable/disable controller
//! and the debounce scheduler. It is cheap to clone; clones share state.
//! Independent instances (e.g. one per test) share nothing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::available_parallelism;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::cache::{CacheDb, CachedRecord};
use crate::config::AppConfig;
use crate::controller::CacheController;
use crate::describe::DescriptionRenderer;
use crate::key::RecordKey;
use crate::scheduler::Debouncer;
use crate::Error;

/// Runtime tuning of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Quiet period before a per-record recompute runs.
    pub record_delay: Duration,
    /// Quiet period before the author index is rebuilt.
    pub index_delay: Duration,
    /// Worker pool size for full rebuilds.
    pub rebuild_workers: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { record_delay: Duration::ZERO, index_delay: Duration::from_secs(5), rebuild_workers: default_workers() }
    }
}

/// Three quarters of the available cores, at least one.
pub fn default_workers() -> usize {
    let cores = available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cores * 3 / 4).max(1)
}

/// What a scheduled job recomputes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Record { key: RecordKey, description_only: bool },
    AuthorIndex,
}

/// Stripes of per-record locks serializing recomputes of the same key.
const RECORD_LOCK_STRIPES: usize = 64;

struct Inner {
    db: CacheDb,
    renderer: Arc<dyn DescriptionRenderer>,
    controller: Arc<CacheController>,
    debouncer: Debouncer<Target>,
    record_locks: Vec<Mutex<()>>,
    rebuild_lock: Mutex<()>,
    index_refreshes: AtomicU64,
    settings: CacheSettings,
}

/// Denormalized record cache.
#[derive(Clone)]
pub struct RecordCache {
    inner: Arc<Inner>,
}

impl RecordCache {
    /// Create a cache over an open database. The cache starts disabled.
    pub fn new(db: CacheDb, renderer: Arc<dyn DescriptionRenderer>, settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                renderer,
                controller: Arc::new(CacheController::new()),
                debouncer: Debouncer::new(),
                record_locks: (0..RECORD_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
                rebuild_lock: Mutex::new(()),
                index_refreshes: AtomicU64::new(0),
                settings,
            }),
        }
    }

    /// Open the database named by the configuration and apply its startup policy.
    pub async fn open(config: &AppConfig, renderer: Arc<dyn DescriptionRenderer>) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        let cache = Self::new(db, renderer, config.cache_settings());
        if config.enable_on_start {
            cache.enable()?;
        }
        tracing::info!(db_path = %config.db_path.display(), enabled = cache.is_enabled(), "record cache opened");
        Ok(cache)
    }

    pub fn db(&self) -> &CacheDb {
        &self.inner.db
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    pub fn controller(&self) -> &Arc<CacheController> {
        &self.inner.controller
    }

    pub(crate) fn renderer(&self) -> &dyn DescriptionRenderer {
        self.inner.renderer.as_ref()
    }

    /// Held across load and write so a slower recompute of a key cannot
    /// overwrite the result of one that started after it.
    pub(crate) async fn lock_record(&self, key: RecordKey) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let stripe = (hasher.finish() % RECORD_LOCK_STRIPES as u64) as usize;
        self.inner.record_locks[stripe].lock().await
    }

    /// Held for a whole full rebuild; rebuilds run one at a time.
    pub(crate) async fn lock_rebuild(&self) -> MutexGuard<'_, ()> {
        self.inner.rebuild_lock.lock().await
    }

    /// See [`CacheController::enable`].
    pub fn enable(&self) -> Result<(), Error> {
        self.inner.controller.enable()
    }

    /// See [`CacheController::disable`].
    pub fn disable(&self) -> Result<(), Error> {
        self.inner.controller.disable()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.controller.is_enabled()
    }

    /// Fetch a cached record by key.
    pub async fn get(&self, key: RecordKey) -> Result<Option<CachedRecord>, Error> {
        self.inner.db.get_cached_record(key).await
    }

    /// Schedule a debounced recompute of one record.
    ///
    /// Failures are logged; the caller never sees them.
    pub fn request_recompute(&self, key: RecordKey, description_only: bool) {
        let cache = self.clone();
        let target = Target::Record { key, description_only };
        self.inner.debouncer.request(target, self.inner.settings.record_delay, async move {
            if let Err(e) = cache.recompute(key, description_only).await {
                tracing::warn!(key = %key, description_only, error = %e, "background recompute failed");
            }
        });
    }

    /// Schedule a debounced rebuild of the author index.
    pub fn request_index_refresh(&self) {
        let cache = self.clone();
        self.inner.debouncer.request(Target::AuthorIndex, self.inner.settings.index_delay, async move {
            if let Err(e) = cache.refresh_author_index().await {
                tracing::warn!(error = %e, "background author index refresh failed");
            }
        });
    }

    /// Drop any not-yet-started recompute of `key`.
    pub fn cancel_recompute(&self, key: RecordKey) {
        for description_only in [false, true] {
            self.inner.debouncer.cancel(&Target::Record { key, description_only });
        }
    }

    /// Whether a recompute of `key` is waiting to run.
    pub fn is_recompute_pending(&self, key: RecordKey) -> bool {
        [false, true]
            .into_iter()
            .any(|description_only| self.inner.debouncer.is_pending(&Target::Record { key, description_only }))
    }

    /// Rebuild the author index now, bypassing the scheduler.
    pub async fn refresh_author_index(&self) -> Result<u64, Error> {
        let rows = self.inner.db.refresh_author_index().await?;
        self.inner.index_refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(rows)
    }

    /// Completed author index rebuilds since this cache was created.
    pub fn index_refresh_count(&self) -> u64 {
        self.inner.index_refreshes.load(Ordering::Relaxed)
    }

    /// Resolve once no scheduled work is pending or running.
    pub async fn wait_idle(&self) {
        self.inner.debouncer.wait_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RecordDetail, RecordFields};
    use crate::describe::PlainRenderer;
    use crate::testing::{test_settings, wired};

    #[test]
    fn test_default_workers_at_least_one() {
        assert!(default_workers() >= 1);
        assert_eq!(CacheSettings::default().index_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_new_cache_starts_disabled() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = RecordCache::new(db, Arc::new(PlainRenderer), test_settings());
        assert!(!cache.is_enabled());
        cache.enable().unwrap();
        assert!(matches!(cache.enable(), Err(Error::AlreadyEnabled)));
        assert!(cache.is_enabled());
    }

    #[tokio::test]
    async fn test_instances_do_not_share_state() {
        let (a, _) = wired().await;
        let (b, _) = wired().await;
        a.disable().unwrap();
        assert!(!a.is_enabled());
        assert!(b.is_enabled());
    }

    #[tokio::test]
    async fn test_open_applies_enable_on_start() {
        let dir = std::env::temp_dir().join(format!("bibcache-open-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = AppConfig { db_path: dir.join("cache.sqlite"), ..AppConfig::default() };

        let cache = RecordCache::open(&config, Arc::new(PlainRenderer)).await.unwrap();
        assert!(cache.is_enabled());

        let config = AppConfig { enable_on_start: false, ..config };
        let cache = RecordCache::open(&config, Arc::new(PlainRenderer)).await.unwrap();
        assert!(!cache.is_enabled());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_recompute_drops_pending_work() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let settings = CacheSettings { record_delay: Duration::from_secs(1), ..test_settings() };
        let cache = RecordCache::new(db.clone(), Arc::new(PlainRenderer), settings);
        let catalog = crate::catalog::Catalog::new(db, Arc::new(crate::testing::RecordingSink::default()));
        let key = catalog
            .create_record(RecordFields::titled("Foo"), RecordDetail::Patent { patent_number: None })
            .await
            .unwrap();

        cache.request_recompute(key, false);
        assert!(cache.is_recompute_pending(key));
        cache.cancel_recompute(key);
        assert!(!cache.is_recompute_pending(key));

        cache.wait_idle().await;
        assert!(cache.get(key).await.unwrap().is_none());
    }
}
