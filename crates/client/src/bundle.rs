//! Burnt-area bundles on local disk.
//!
//! A bundle is a JSON document produced ahead of time from the burnt-area
//! service:
//!
//! ```json
//! {
//!   "year": 2024, "region": "UK", "generatedAt": "2024-05-01T00:00:00Z", "featureCount": 1,
//!   "features": [{ "id": "ba.1", "centroid": [-1.2, 52.1], "boundaryPoints": [[-1.3, 52.0], ...],
//!                  "areaHectares": 12.5, "fireDate": "2024-04-20", "seasonYear": 2024 }]
//! }
//! ```
//!
//! Features are decoded one by one; malformed ones and polygons with fewer
//! than three vertices are skipped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use hazardmap_core::geo::BoundingBox;
use hazardmap_core::resolve::{QueryFilters, RemoteDataClient, RemoteError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hazards::{BurntArea, BurntAreaSet};

/// Filter key restricting features to one fire season.
pub const YEAR_FILTER: &str = "year";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurntAreaBundle {
    pub year: i32,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub feature_count: usize,
    #[serde(default)]
    pub features: Vec<BurntArea>,
}

impl BurntAreaBundle {
    /// Parse a bundle, skipping unusable features.
    ///
    /// Returns the bundle and the number of features skipped.
    pub fn from_json_slice(bytes: &[u8]) -> Result<(Self, usize), RemoteError> {
        let root: Value = serde_json::from_slice(bytes).map_err(|e| RemoteError::Parse(e.to_string()))?;
        let Value::Object(mut root) = root else {
            return Err(RemoteError::Parse("bundle must be a JSON object".into()));
        };

        let year = root
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok())
            .ok_or_else(|| RemoteError::Parse("bundle has no year".into()))?;

        let mut features = Vec::new();
        let mut skipped = 0;
        if let Some(Value::Array(raw)) = root.remove("features") {
            for raw in raw {
                match serde_json::from_value::<BurntArea>(raw) {
                    Ok(f) if f.boundary_points.len() >= BurntArea::MIN_BOUNDARY_POINTS => features.push(f),
                    Ok(f) => {
                        tracing::debug!(id = %f.id, points = f.boundary_points.len(), "skipping degenerate polygon");
                        skipped += 1;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping malformed bundle feature");
                        skipped += 1;
                    }
                }
            }
        }

        let bundle = Self {
            year,
            region: root.get("region").and_then(Value::as_str).unwrap_or_default().to_string(),
            generated_at: root.get("generatedAt").and_then(Value::as_str).map(str::to_string),
            feature_count: features.len(),
            features,
        };
        Ok((bundle, skipped))
    }
}

/// Serves a bundle file as a tier.
///
/// The file is re-read on every fetch so a bundle refreshed on disk is picked
/// up without a restart.
#[derive(Debug, Clone)]
pub struct BundleTierClient {
    path: PathBuf,
}

impl BundleTierClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<BurntAreaBundle, RemoteError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| RemoteError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let (bundle, skipped) = BurntAreaBundle::from_json_slice(&bytes)?;
        if skipped > 0 {
            tracing::warn!(path = %self.path.display(), skipped, "bundle contained unusable features");
        }
        Ok(bundle)
    }
}

#[async_trait]
impl RemoteDataClient<BurntAreaSet> for BundleTierClient {
    async fn fetch(
        &self, bounds: &BoundingBox, filters: &QueryFilters, _timeout: Duration,
    ) -> Result<BurntAreaSet, RemoteError> {
        let season = match filters.get(YEAR_FILTER) {
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| RemoteError::Unavailable(format!("invalid {YEAR_FILTER} filter: {raw}")))?,
            ),
            None => None,
        };

        let bundle = self.load().await?;
        let features = bundle.features.into_iter().filter(|f| season.is_none_or(|year| f.season_year == year));
        Ok(BurntAreaSet::clipped(features, bounds))
    }

    fn name(&self) -> &str {
        "bundle"
    }
}
