//! MCP tool implementations.
//!
//! This module contains all tools exposed by the bibcache server.

pub mod maintenance;
pub mod papers;
pub mod records;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

/// Wrap a serializable output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(ToolError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use bibcache_core::{CacheDb, CacheSettings, Catalog, PlainRenderer, RecordCache};
    use rmcp::model::CallToolResult;

    /// An enabled cache over an in-memory database, with a catalog publishing into it.
    pub async fn wired() -> (RecordCache, Catalog) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let settings = CacheSettings {
            record_delay: Duration::ZERO,
            index_delay: Duration::from_millis(20),
            rebuild_workers: 2,
        };
        let cache = RecordCache::new(db.clone(), Arc::new(PlainRenderer), settings);
        cache.enable().unwrap();
        let catalog = Catalog::new(db, Arc::new(cache.clone()));
        (cache, catalog)
    }

    /// Decode the JSON text of a successful tool result.
    pub fn output_json(result: &CallToolResult) -> serde_json::Value {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
