//! cache_invalidate tool implementation.
//!
//! Drops one geohash cell from memory and from the store.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::{HazardLayer, HazardState};
use crate::tools::json_result;

/// Parameters for the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateParams {
    /// Geohash cache key (as listed by cache_stats).
    pub geohash: String,

    /// Layer to invalidate. All layers when omitted.
    #[serde(default)]
    pub layer: Option<HazardLayer>,
}

/// Output from the cache_invalidate tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInvalidateOutput {
    pub geohash: String,
    /// Layers that held the cell.
    pub removed: Vec<HazardLayer>,
}

/// Implementation of the cache_invalidate tool.
pub async fn invalidate_impl(state: &HazardState, params: CacheInvalidateParams) -> Result<CallToolResult, McpError> {
    let mut removed = Vec::new();
    for layer in HazardLayer::selection(params.layer) {
        let hit = match layer {
            HazardLayer::Hotspots => state.hotspots.invalidate(&params.geohash).await?,
            HazardLayer::BurntAreas => state.burnt_areas.invalidate(&params.geohash).await?,
        };
        if hit {
            removed.push(layer);
        }
    }

    json_result(&CacheInvalidateOutput { geohash: params.geohash, removed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use crate::tools::tests::output_json;
    use hazardmap_client::{BurntAreaSet, HotspotSet};
    use hazardmap_core::AppConfig;

    #[tokio::test]
    async fn test_invalidate_one_layer() {
        let state = test_state(AppConfig::default()).await;
        let key = state.hotspots.orchestrator().cache().set(51.5074, -0.1278, HotspotSet::default()).unwrap();
        state.burnt_areas.orchestrator().cache().set(51.5074, -0.1278, BurntAreaSet::default()).unwrap();
        assert_eq!(key, "gcpvj");

        let params = CacheInvalidateParams { geohash: key.clone(), layer: Some(HazardLayer::Hotspots) };
        let json = output_json(&invalidate_impl(&state, params).await.unwrap());

        assert_eq!(json["removed"], serde_json::json!(["hotspots"]));
        assert!(!state.hotspots.orchestrator().cache().contains_key(&key));
        assert!(state.burnt_areas.orchestrator().cache().contains_key(&key));
    }

    #[tokio::test]
    async fn test_invalidate_missing_cell() {
        let state = test_state(AppConfig::default()).await;
        let params = CacheInvalidateParams { geohash: "u4pru".into(), layer: None };
        let json = output_json(&invalidate_impl(&state, params).await.unwrap());
        assert!(json["removed"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_rejects_bad_geohash() {
        let state = test_state(AppConfig::default()).await;
        let params = CacheInvalidateParams { geohash: "gcpv!".into(), layer: None };
        let err = invalidate_impl(&state, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
        assert!(err.message.contains("INVALID_GEOHASH"));
    }
}
