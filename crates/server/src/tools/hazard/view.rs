//! hazard_view tool implementation.
//!
//! Reads the committed views without touching any tier.

use hazardmap_core::{DataMode, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{LayerView, committed_view};
use crate::state::{HazardLayer, HazardState};
use crate::tools::json_result;

/// Parameters for the hazard_view tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct HazardViewParams {
    /// Layer to read. All layers when omitted.
    #[serde(default)]
    pub layer: Option<HazardLayer>,

    /// Include the raw payload in the output.
    #[serde(default)]
    pub include_payload: bool,
}

/// Output from the hazard_view tool.
#[derive(Debug, Clone, Serialize)]
pub struct HazardViewOutput {
    pub mode: DataMode,
    /// Committed views; layers never refreshed are absent.
    pub views: Vec<LayerView>,
}

/// Implementation of the hazard_view tool.
pub async fn view_impl(state: &HazardState, params: HazardViewParams) -> Result<CallToolResult, McpError> {
    let views = HazardLayer::selection(params.layer)
        .into_iter()
        .filter_map(|layer| committed_view(state, layer, params.include_payload).transpose())
        .collect::<Result<Vec<_>, Error>>()?;

    json_result(&HazardViewOutput { mode: state.hotspots.mode(), views })
}
