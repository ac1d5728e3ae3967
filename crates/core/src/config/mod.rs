//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (BIBCACHE_*)
//! 2. TOML config file (if BIBCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::service::{CacheSettings, default_workers};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (BIBCACHE_*)
/// 2. TOML config file (if BIBCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding the catalog and the cache.
    ///
    /// Set via BIBCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Quiet period before a per-record recompute runs, in milliseconds.
    ///
    /// Set via BIBCACHE_RECORD_DEBOUNCE_MS environment variable.
    #[serde(default)]
    pub record_debounce_ms: u64,

    /// Quiet period before the author index is rebuilt, in milliseconds.
    ///
    /// Set via BIBCACHE_INDEX_DEBOUNCE_MS environment variable.
    #[serde(default = "default_index_debounce_ms")]
    pub index_debounce_ms: u64,

    /// Worker pool size for full rebuilds; derived from the core count when unset.
    ///
    /// Set via BIBCACHE_REBUILD_WORKERS environment variable.
    #[serde(default)]
    pub rebuild_workers: Option<usize>,

    /// Whether the cache reacts to change events as soon as it is opened.
    ///
    /// Set via BIBCACHE_ENABLE_ON_START environment variable.
    #[serde(default = "default_true")]
    pub enable_on_start: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./bibcache.sqlite")
}

fn default_index_debounce_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            record_debounce_ms: 0,
            index_debounce_ms: default_index_debounce_ms(),
            rebuild_workers: None,
            enable_on_start: true,
        }
    }
}

impl AppConfig {
    /// Runtime settings for [`crate::RecordCache`].
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            record_delay: Duration::from_millis(self.record_debounce_ms),
            index_delay: Duration::from_millis(self.index_debounce_ms),
            rebuild_workers: self.rebuild_workers.unwrap_or_else(default_workers),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `BIBCACHE_`
    /// 2. TOML file from `BIBCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("BIBCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("BIBCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
