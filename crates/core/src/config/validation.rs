//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Longest accepted per-record debounce: one minute.
const MAX_RECORD_DEBOUNCE_MS: u64 = 60_000;

/// Longest accepted author index debounce: ten minutes.
const MAX_INDEX_DEBOUNCE_MS: u64 = 600_000;

const MAX_REBUILD_WORKERS: usize = 256;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `db_path` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `record_debounce_ms` exceeds one minute
    /// - `index_debounce_ms` exceeds ten minutes
    /// - `rebuild_workers` is set outside 1..=256
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set BIBCACHE_DB_PATH environment variable".into(),
            });
        }

        if self.record_debounce_ms > MAX_RECORD_DEBOUNCE_MS {
            return Err(ConfigError::Invalid {
                field: "record_debounce_ms".into(),
                reason: format!("must not exceed {MAX_RECORD_DEBOUNCE_MS}ms"),
            });
        }

        if self.index_debounce_ms > MAX_INDEX_DEBOUNCE_MS {
            return Err(ConfigError::Invalid {
                field: "index_debounce_ms".into(),
                reason: format!("must not exceed {MAX_INDEX_DEBOUNCE_MS}ms"),
            });
        }

        if self.rebuild_workers.is_some_and(|w| !(1..=MAX_REBUILD_WORKERS).contains(&w)) {
            return Err(ConfigError::Invalid {
                field: "rebuild_workers".into(),
                reason: format!("must be between 1 and {MAX_REBUILD_WORKERS}"),
            });
        }

        if self.index_debounce_ms == 0 {
            tracing::warn!("index_debounce_ms is 0; every author link edit rebuilds the whole author index");
        }

        Ok(())
    }
}
