//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::state::HazardState;
use crate::tools::cache::{CacheClearParams, CacheInvalidateParams, clear_impl, invalidate_impl, stats_impl};
use crate::tools::hazard::{
    HazardRefreshParams, HazardRezoomParams, HazardViewParams, refresh_impl, rezoom_impl, view_impl,
};
use crate::tools::mode::{SetModeParams, set_mode_impl};

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

/// The main MCP server handler for hazardmap.
#[derive(Clone)]
pub struct HazardMapServer {
    state: Arc<HazardState>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl HazardMapServer {
    /// Create a new server handler.
    pub fn new(state: Arc<HazardState>) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    /// Resolve a layer for a viewport and commit it.
    ///
    /// Tiers are tried in order (primary, secondary, cache, synthetic); the
    /// result records which tier answered and how the others failed.
    #[tool(
        description = "Fetch a hazard layer (hotspots or burnt_areas) for a bounding box and zoom. Returns the committed view with provenance, tier attempts and clusters, or 'superseded' if a newer refresh won."
    )]
    async fn hazard_refresh(&self, params: Parameters<HazardRefreshParams>) -> Result<CallToolResult, McpError> {
        refresh_impl(&self.state, params.0).await
    }

    #[tool(description = "Re-cluster committed views for a new zoom level without refetching.")]
    async fn hazard_rezoom(&self, params: Parameters<HazardRezoomParams>) -> Result<CallToolResult, McpError> {
        rezoom_impl(&self.state, params.0).await
    }

    #[tool(description = "Read the committed view of one or all hazard layers. Makes no network requests.")]
    async fn hazard_view(&self, params: Parameters<HazardViewParams>) -> Result<CallToolResult, McpError> {
        view_impl(&self.state, params.0).await
    }

    #[tool(description = "Report entry counts, limits and per-cell lifetime and last access of each layer's spatial cache.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.state).await
    }

    #[tool(description = "Remove one geohash cell from the cache of one or all layers, in memory and on disk.")]
    async fn cache_invalidate(&self, params: Parameters<CacheInvalidateParams>) -> Result<CallToolResult, McpError> {
        invalidate_impl(&self.state, params.0).await
    }

    #[tool(description = "Clear the cache and committed view of one or all layers, in memory and on disk.")]
    async fn cache_clear(&self, params: Parameters<CacheClearParams>) -> Result<CallToolResult, McpError> {
        clear_impl(&self.state, params.0).await
    }

    /// Switch the data policy of every layer.
    #[tool(
        description = "Set the data mode: 'live' (remote tiers, cache, then demo data), 'strict_live' (never demo data) or 'demo' (demo data only). Clears committed views."
    )]
    async fn set_mode(&self, params: Parameters<SetModeParams>) -> Result<CallToolResult, McpError> {
        set_mode_impl(&self.state, params.0).await
    }
}

impl ServerHandler for HazardMapServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "hazardmap".into(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use hazardmap_core::AppConfig;

    #[tokio::test]
    async fn test_router_lists_every_tool() {
        let server = HazardMapServer::new(Arc::new(test_state(AppConfig::default()).await));
        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cache_clear",
                "cache_invalidate",
                "cache_stats",
                "hazard_refresh",
                "hazard_rezoom",
                "hazard_view",
                "set_mode"
            ]
        );
    }

    #[tokio::test]
    async fn test_server_info() {
        let server = HazardMapServer::new(Arc::new(test_state(AppConfig::default()).await));
        let info = server.get_info();
        assert_eq!(info.server_info.name, "hazardmap");
        assert!(info.capabilities.tools.is_some());
    }
}
