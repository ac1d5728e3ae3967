//! Cache maintenance tools: full_rebuild, author_index_refresh, cache_enable,
//! cache_disable and cache_status.

use bibcache_core::{RebuildReport, RecordCache};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the full_rebuild tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FullRebuildParams {
    /// Number of partitions the record set is split into (default: the worker count).
    #[serde(default)]
    pub partitions: Option<usize>,

    /// Rebuild the author index once the records are done (default: true).
    #[serde(default = "default_true")]
    pub refresh_index: bool,
}

fn default_true() -> bool {
    true
}

/// Output of the full_rebuild tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FullRebuildOutput {
    pub report: RebuildReport,
    /// Author index rows written, when the index was refreshed.
    pub index_entries: Option<u64>,
}

/// Output of the author_index_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexRefreshOutput {
    pub index_entries: u64,
}

/// Output of the cache_enable, cache_disable and cache_status tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusOutput {
    pub enabled: bool,
    pub cached_records: u64,
    pub index_entries: u64,
}

/// Implementation of the full_rebuild tool.
pub async fn rebuild_impl(cache: &RecordCache, params: FullRebuildParams) -> Result<CallToolResult, McpError> {
    let partitions = params.partitions.unwrap_or(cache.settings().rebuild_workers);
    let report = cache.full_rebuild(partitions).await?;

    let index_entries = if params.refresh_index { Some(cache.refresh_author_index().await?) } else { None };

    json_result(&FullRebuildOutput { report, index_entries })
}

/// Implementation of the author_index_refresh tool.
pub async fn index_refresh_impl(cache: &RecordCache) -> Result<CallToolResult, McpError> {
    let index_entries = cache.refresh_author_index().await?;
    json_result(&IndexRefreshOutput { index_entries })
}

/// Implementation of the cache_status tool.
pub async fn status_impl(cache: &RecordCache) -> Result<CallToolResult, McpError> {
    let output = CacheStatusOutput {
        enabled: cache.is_enabled(),
        cached_records: cache.db().cached_record_count().await?,
        index_entries: cache.db().author_index_count().await?,
    };
    json_result(&output)
}

/// Implementation of the cache_enable tool.
pub async fn enable_impl(cache: &RecordCache) -> Result<CallToolResult, McpError> {
    cache.enable()?;
    status_impl(cache).await
}

/// Implementation of the cache_disable tool.
pub async fn disable_impl(cache: &RecordCache) -> Result<CallToolResult, McpError> {
    cache.disable()?;
    status_impl(cache).await
}
