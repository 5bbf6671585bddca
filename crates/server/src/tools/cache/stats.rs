//! cache_stats tool implementation.
//!
//! Reports the in-memory cache of every layer.

use hazardmap_core::{CacheMetadata, CellInfo, FeatureSource, MapSession};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde::Serialize;

use crate::state::{HazardLayer, HazardState};
use crate::tools::json_result;

#[derive(Debug, Clone, Serialize)]
pub struct LayerCacheStats {
    pub layer: HazardLayer,
    /// Store namespace, when the layer persists.
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub metadata: CacheMetadata,
    /// Cells currently held with their lifetime and last access, sorted by geohash.
    pub cells: Vec<CellInfo>,
}

/// Output from the cache_stats tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsOutput {
    pub layers: Vec<LayerCacheStats>,
}

fn layer_stats<T>(session: &MapSession<T>, layer: HazardLayer) -> LayerCacheStats
where
    T: FeatureSource + Clone + Serialize + Send + Sync + 'static,
{
    LayerCacheStats {
        layer,
        namespace: session.orchestrator().store().map(|s| s.namespace().to_string()),
        metadata: session.cache_metadata(),
        cells: session.orchestrator().cache().cells(),
    }
}

/// Implementation of the cache_stats tool.
pub async fn stats_impl(state: &HazardState) -> Result<CallToolResult, McpError> {
    let output = CacheStatsOutput {
        layers: vec![
            layer_stats(&state.hotspots, HazardLayer::Hotspots),
            layer_stats(&state.burnt_areas, HazardLayer::BurntAreas),
        ],
    };
    json_result(&output)
}
