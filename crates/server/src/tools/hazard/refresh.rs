//! hazard_refresh tool implementation.
//!
//! Resolves one layer for a viewport through the tier chain and commits the
//! result unless a newer refresh of the same layer overtook it.

use std::collections::BTreeMap;

use hazardmap_core::{BoundingBox, CommitOutcome, Error, FeatureSource, HazardQuery, MapSession};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{LayerView, check_zoom};
use crate::state::{HazardLayer, HazardState};
use crate::tools::json_result;

/// Parameters for the hazard_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HazardRefreshParams {
    /// Layer to refresh.
    pub layer: HazardLayer,

    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,

    /// Map zoom used for clustering (0-22).
    pub zoom: f64,

    /// Extra query parameters passed to the remote tiers (e.g. `days`, `year`).
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    /// Include the raw payload in the output.
    #[serde(default)]
    pub include_payload: bool,
}

/// Output from the hazard_refresh tool.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HazardRefreshOutput {
    Committed { view: Box<LayerView> },
    /// The result was dropped; `current` is the sequence that superseded it.
    Superseded { layer: HazardLayer, sequence: u64, current: Option<u64> },
}

async fn refresh_layer<T>(
    session: &MapSession<T>, layer: HazardLayer, query: HazardQuery, zoom: f64, include_payload: bool,
) -> Result<HazardRefreshOutput, Error>
where
    T: FeatureSource + Clone + Serialize + Send + Sync + 'static,
{
    match session.refresh(query, zoom).await {
        CommitOutcome::Committed(view) => {
            Ok(HazardRefreshOutput::Committed { view: Box::new(LayerView::new(layer, &*view, include_payload)?) })
        }
        CommitOutcome::Superseded { token, current } => {
            Ok(HazardRefreshOutput::Superseded { layer, sequence: token.sequence, current })
        }
    }
}

/// Implementation of the hazard_refresh tool.
pub async fn refresh_impl(state: &HazardState, params: HazardRefreshParams) -> Result<CallToolResult, McpError> {
    let bounds = BoundingBox::new(params.min_lat, params.min_lon, params.max_lat, params.max_lon)?;
    let zoom = check_zoom(params.zoom)?;

    let mut query = HazardQuery::new(params.layer.as_str(), bounds);
    query.filters = params.filters;

    let output = match params.layer {
        HazardLayer::Hotspots => {
            refresh_layer(&state.hotspots, params.layer, query, zoom, params.include_payload).await?
        }
        HazardLayer::BurntAreas => {
            refresh_layer(&state.burnt_areas, params.layer, query, zoom, params.include_payload).await?
        }
    };

    json_result(&output)
}
