//! set_mode tool implementation.
//!
//! Switches the data policy of every layer. In-flight refreshes are
//! superseded and committed views are cleared.

use hazardmap_core::DataMode;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::HazardState;
use crate::tools::json_result;

/// Parameters for the set_mode tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetModeParams {
    /// `live`, `strict_live` or `demo`.
    pub mode: DataMode,
}

/// Output from the set_mode tool.
#[derive(Debug, Clone, Serialize)]
pub struct SetModeOutput {
    pub previous: DataMode,
    pub mode: DataMode,
}

/// Implementation of the set_mode tool.
pub async fn set_mode_impl(state: &HazardState, params: SetModeParams) -> Result<CallToolResult, McpError> {
    let previous = state.hotspots.set_mode(params.mode);
    state.burnt_areas.set_mode(params.mode);

    json_result(&SetModeOutput { previous, mode: params.mode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HazardLayer;
    use crate::state::tests::test_state;
    use crate::tools::hazard::refresh::{refresh_impl, tests::params};
    use crate::tools::tests::output_json;
    use hazardmap_core::AppConfig;

    #[tokio::test]
    async fn test_set_mode_clears_views() {
        let state = test_state(AppConfig::default()).await;
        refresh_impl(&state, params(HazardLayer::Hotspots, 5.0)).await.unwrap();
        refresh_impl(&state, params(HazardLayer::BurntAreas, 5.0)).await.unwrap();

        let json = output_json(&set_mode_impl(&state, SetModeParams { mode: DataMode::StrictLive }).await.unwrap());
        assert_eq!(json["previous"], "live");
        assert_eq!(json["mode"], "strict_live");

        assert_eq!(state.hotspots.mode(), DataMode::StrictLive);
        assert_eq!(state.burnt_areas.mode(), DataMode::StrictLive);
        assert!(state.hotspots.view("hotspots").is_none());
        assert!(state.burnt_areas.view("burnt_areas").is_none());
    }

    #[tokio::test]
    async fn test_demo_mode_serves_synthetic_only() {
        let state = test_state(AppConfig { mode: DataMode::StrictLive, ..Default::default() }).await;
        set_mode_impl(&state, SetModeParams { mode: DataMode::Demo }).await.unwrap();

        let json = output_json(&refresh_impl(&state, params(HazardLayer::Hotspots, 5.0)).await.unwrap());
        assert_eq!(json["view"]["provenance"], "synthetic");
        assert_eq!(json["view"]["attempts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_mode_params_parse() {
        let params: SetModeParams = serde_json::from_str(r#"{"mode": "demo"}"#).unwrap();
        assert_eq!(params.mode, DataMode::Demo);
        assert!(serde_json::from_str::<SetModeParams>(r#"{"mode": "offline"}"#).is_err());
    }
}
