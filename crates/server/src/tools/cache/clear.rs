//! cache_clear tool implementation.
//!
//! Wipes a layer's cache in memory and in the store, along with its
//! committed view.

use hazardmap_core::engine::ClearStats;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::{HazardLayer, HazardState};
use crate::tools::json_result;

/// Parameters for the cache_clear tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearParams {
    /// Layer to clear. All layers when omitted.
    #[serde(default)]
    pub layer: Option<HazardLayer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerClear {
    pub layer: HazardLayer,
    #[serde(flatten)]
    pub stats: ClearStats,
}

/// Output from the cache_clear tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheClearOutput {
    pub cleared: Vec<LayerClear>,
}

/// Implementation of the cache_clear tool.
pub async fn clear_impl(state: &HazardState, params: CacheClearParams) -> Result<CallToolResult, McpError> {
    let mut cleared = Vec::new();
    for layer in HazardLayer::selection(params.layer) {
        let stats = match layer {
            HazardLayer::Hotspots => state.hotspots.clear_all().await?,
            HazardLayer::BurntAreas => state.burnt_areas.clear_all().await?,
        };
        cleared.push(LayerClear { layer, stats });
    }

    json_result(&CacheClearOutput { cleared })
}
