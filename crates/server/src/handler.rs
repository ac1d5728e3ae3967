//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::{
    maintenance::{self, FullRebuildParams},
    papers::{self, PapersByAuthorParams, PapersByUnitParams},
    records::{self, RecordGetParams, RecordRefreshParams, RecordSearchParams},
};

use bibcache_core::RecordCache;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for bibcache.
#[derive(Clone)]
pub struct BibcacheServer {
    cache: RecordCache,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl BibcacheServer {
    /// Create a new server handler over an opened cache.
    pub fn new(cache: RecordCache) -> Self {
        Self { cache, tool_router: Self::tool_router() }
    }

    #[tool(description = "Get a cached record by its composite key (\"<kind>:<id>\").")]
    async fn record_get(&self, params: Parameters<RecordGetParams>) -> Result<CallToolResult, McpError> {
        records::get_impl(&self.cache, params.0).await
    }

    /// Recompute one record now, bypassing the debounce delay and the enabled flag.
    #[tool(description = "Recompute a cached record from its source now. Set description_only to keep cached scalars.")]
    async fn record_refresh(&self, params: Parameters<RecordRefreshParams>) -> Result<CallToolResult, McpError> {
        records::refresh_impl(&self.cache, params.0).await
    }

    #[tool(description = "Search cached records by word prefixes of title, source and author names.")]
    async fn record_search(&self, params: Parameters<RecordSearchParams>) -> Result<CallToolResult, McpError> {
        records::search_impl(&self.cache, params.0).await
    }

    #[tool(description = "List cached records of an author, optionally by responsibility or affiliated links only.")]
    async fn papers_by_author(&self, params: Parameters<PapersByAuthorParams>) -> Result<CallToolResult, McpError> {
        papers::by_author_impl(&self.cache, params.0).await
    }

    #[tool(description = "List cached records linked to a unit, optionally by responsibility or affiliation.")]
    async fn papers_by_unit(&self, params: Parameters<PapersByUnitParams>) -> Result<CallToolResult, McpError> {
        papers::by_unit_impl(&self.cache, params.0).await
    }

    /// Rebuild every cached record.
    ///
    /// Change events arriving meanwhile are dropped, so the index is refreshed
    /// afterwards unless the caller opts out.
    #[tool(description = "Rebuild every cached record from the source tables, then the author index.")]
    async fn full_rebuild(&self, params: Parameters<FullRebuildParams>) -> Result<CallToolResult, McpError> {
        maintenance::rebuild_impl(&self.cache, params.0).await
    }

    #[tool(description = "Rebuild the author index now.")]
    async fn author_index_refresh(&self) -> Result<CallToolResult, McpError> {
        maintenance::index_refresh_impl(&self.cache).await
    }

    #[tool(description = "Start reacting to change events.")]
    async fn cache_enable(&self) -> Result<CallToolResult, McpError> {
        maintenance::enable_impl(&self.cache).await
    }

    #[tool(description = "Stop reacting to change events; events received while disabled are dropped.")]
    async fn cache_disable(&self) -> Result<CallToolResult, McpError> {
        maintenance::disable_impl(&self.cache).await
    }

    #[tool(description = "Report whether the cache is enabled and how many rows it holds.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        maintenance::status_impl(&self.cache).await
    }
}

impl ServerHandler for BibcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "bibcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
