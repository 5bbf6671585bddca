//! hazard_rezoom tool implementation.
//!
//! Re-clusters committed views for a new zoom without refetching. Small zoom
//! changes inside the hysteresis band leave the clusters untouched.

use hazardmap_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{LayerView, check_zoom, committed_view};
use crate::state::{HazardLayer, HazardState};
use crate::tools::json_result;

/// Parameters for the hazard_rezoom tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HazardRezoomParams {
    /// New map zoom (0-22).
    pub zoom: f64,
}

/// Output from the hazard_rezoom tool.
#[derive(Debug, Clone, Serialize)]
pub struct HazardRezoomOutput {
    pub zoom: f64,
    /// Layers whose clusters were recomputed.
    pub changed: Vec<HazardLayer>,
    pub views: Vec<LayerView>,
}

/// Implementation of the hazard_rezoom tool.
pub async fn rezoom_impl(state: &HazardState, params: HazardRezoomParams) -> Result<CallToolResult, McpError> {
    let zoom = check_zoom(params.zoom)?;

    let mut changed = Vec::new();
    if !state.hotspots.rezoom(zoom).is_empty() {
        changed.push(HazardLayer::Hotspots);
    }
    if !state.burnt_areas.rezoom(zoom).is_empty() {
        changed.push(HazardLayer::BurntAreas);
    }

    let views = changed
        .iter()
        .filter_map(|&layer| committed_view(state, layer, false).transpose())
        .collect::<Result<Vec<_>, Error>>()?;

    json_result(&HazardRezoomOutput { zoom, changed, views })
}
