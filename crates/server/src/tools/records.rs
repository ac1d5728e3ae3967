//! record_get, record_refresh and record_search tool implementations.

use bibcache_core::{CachedRecord, Error, RecordCache, RecordKey};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the record_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordGetParams {
    /// Composite record key, e.g. "continuous_publication:42".
    pub key: String,
}

/// Parameters for the record_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordRefreshParams {
    /// Composite record key, e.g. "patent:7".
    pub key: String,

    /// Recompute only the description fields, keeping cached scalars.
    #[serde(default)]
    pub description_only: bool,
}

/// Parameters for the record_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordSearchParams {
    /// Words that must all prefix-match a word of the record's search text.
    pub query: String,

    /// Maximum number of records returned (default: 50, capped at 500).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Output of the record_get and record_refresh tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordOutput {
    pub record: CachedRecord,
}

/// Output of the record_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordListOutput {
    pub count: usize,
    pub records: Vec<CachedRecord>,
}

impl From<Vec<CachedRecord>> for RecordListOutput {
    fn from(records: Vec<CachedRecord>) -> Self {
        Self { count: records.len(), records }
    }
}

/// Implementation of the record_get tool.
pub async fn get_impl(cache: &RecordCache, params: RecordGetParams) -> Result<CallToolResult, McpError> {
    let key: RecordKey = params.key.parse()?;
    let record = cache
        .get(key)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no cached record for {key}")))?;

    json_result(&RecordOutput { record })
}

/// Implementation of the record_refresh tool.
pub async fn refresh_impl(cache: &RecordCache, params: RecordRefreshParams) -> Result<CallToolResult, McpError> {
    let key: RecordKey = params.key.parse()?;
    let record = cache.refresh(key, params.description_only).await?;

    json_result(&RecordOutput { record })
}

/// Implementation of the record_search tool.
pub async fn search_impl(cache: &RecordCache, params: RecordSearchParams) -> Result<CallToolResult, McpError> {
    let records = cache.db().search_records(&params.query, params.limit).await?;

    json_result(&RecordListOutput::from(records))
}
