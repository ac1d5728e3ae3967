//! papers_by_author and papers_by_unit tool implementations.
//!
//! Both read the author index; records added since its last refresh show up
//! once the debounced rebuild has run.

use bibcache_core::RecordCache;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use super::records::RecordListOutput;
use crate::error::ToolError;

/// Parameters for the papers_by_author tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PapersByAuthorParams {
    pub author_id: i64,

    /// Only links with this responsibility abbreviation (e.g. "aut.", "red.").
    #[serde(default)]
    pub responsibility: Option<String>,

    /// Only links marked affiliated to a unit that employs staff.
    #[serde(default)]
    pub affiliated_only: bool,
}

/// Parameters for the papers_by_unit tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PapersByUnitParams {
    pub unit_id: i64,

    /// Only links with this responsibility abbreviation.
    #[serde(default)]
    pub responsibility: Option<String>,

    /// Restrict to affiliated (true) or unaffiliated (false) links.
    #[serde(default)]
    pub affiliated: Option<bool>,
}

/// Implementation of the papers_by_author tool.
pub async fn by_author_impl(cache: &RecordCache, params: PapersByAuthorParams) -> Result<CallToolResult, McpError> {
    let db = cache.db();
    let records = match (params.responsibility, params.affiliated_only) {
        (Some(_), true) => {
            return Err(ToolError::InvalidInput("responsibility and affiliated_only cannot be combined".into()).into());
        }
        (Some(role), false) => db.papers_by_author_and_role(params.author_id, &role).await?,
        (None, true) => db.papers_by_author_affiliated(params.author_id).await?,
        (None, false) => db.papers_by_author(params.author_id).await?,
    };

    json_result(&RecordListOutput::from(records))
}

/// Implementation of the papers_by_unit tool.
pub async fn by_unit_impl(cache: &RecordCache, params: PapersByUnitParams) -> Result<CallToolResult, McpError> {
    let db = cache.db();
    let records = match (params.responsibility, params.affiliated) {
        (Some(_), Some(_)) => {
            return Err(ToolError::InvalidInput("responsibility and affiliated cannot be combined".into()).into());
        }
        (Some(role), None) => db.papers_by_unit_and_role(params.unit_id, &role).await?,
        (None, affiliated) => db.papers_by_unit(params.unit_id, affiliated).await?,
    };

    json_result(&RecordListOutput::from(records))
}
