//! Zoom-aware point clustering.
//!
//! Features are bucketed into a fixed lat/lon grid whose cell size tracks a
//! constant on-screen radius: `cell_deg = radius_px * 360 / (tile_size * 2^zoom)`.
//! Each feature lands in exactly one cell, so the result depends only on the
//! feature set and the zoom, never on input order. Near cell edges two close
//! points can fall into different clusters; that is the accepted cost of a
//! fixed grid.

mod view;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

pub use view::ClusterView;

/// Deepest zoom a map will request.
pub const MAX_ZOOM: f64 = 22.0;

pub const DEFAULT_RADIUS_PX: f64 = 60.0;
pub const DEFAULT_TILE_SIZE: f64 = 256.0;
pub const DEFAULT_MAX_CLUSTER_ZOOM: f64 = 14.0;
pub const DEFAULT_HYSTERESIS: f64 = 0.5;

/// A point that can be clustered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterableFeature {
    pub id: String,
    pub location: GeoPoint,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

/// Payloads that carry clusterable points.
pub trait FeatureSource {
    fn features(&self) -> Vec<ClusterableFeature>;
}

impl FeatureSource for Vec<ClusterableFeature> {
    fn features(&self) -> Vec<ClusterableFeature> {
        self.clone()
    }
}

/// One or more features merged for display at a zoom range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub centroid: GeoPoint,
    pub member_count: usize,
    /// Largest member weight. Weights are never summed.
    pub max_weight: f64,
    pub zoom_valid_from: f64,
    pub zoom_valid_to: f64,
    /// Sorted.
    pub member_ids: Vec<String>,
}

impl Cluster {
    pub fn is_singleton(&self) -> bool {
        self.member_count == 1
    }

    pub fn is_valid_at(&self, zoom: f64) -> bool {
        (self.zoom_valid_from..=self.zoom_valid_to).contains(&zoom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterConfig {
    /// Visual clustering radius in screen pixels.
    pub radius_px: f64,
    pub tile_size: f64,
    /// At or above this zoom every feature is its own cluster.
    pub max_cluster_zoom: f64,
    /// Zoom change needed before clusters are recomputed.
    pub hysteresis: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius_px: DEFAULT_RADIUS_PX,
            tile_size: DEFAULT_TILE_SIZE,
            max_cluster_zoom: DEFAULT_MAX_CLUSTER_ZOOM,
            hysteresis: DEFAULT_HYSTERESIS,
        }
    }
}

/// Grid-based clusterer. Stateless apart from its configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialClusterer {
    config: ClusterConfig,
}

impl SpatialClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ClusterConfig {
        self.config
    }

    /// Grid cell edge in degrees at `zoom`.
    pub fn cell_size_deg(&self, zoom: f64) -> f64 {
        self.config.radius_px * 360.0 / (self.config.tile_size * 2f64.powf(zoom))
    }

    /// Cluster `features` for display at `zoom`.
    ///
    /// Output is sorted by grid cell (or by id for singletons) so equal inputs
    /// in any order give identical lists. Non-finite zooms are treated as 0.
    pub fn cluster(&self, features: &[ClusterableFeature], zoom: f64) -> Vec<Cluster> {
        if features.is_empty() {
            return Vec::new();
        }
        let zoom = if zoom.is_finite() { zoom.clamp(0.0, MAX_ZOOM) } else { 0.0 };

        if zoom >= self.config.max_cluster_zoom {
            return self.singletons(features);
        }

        let cell = self.cell_size_deg(zoom);
        let mut cells: BTreeMap<(i64, i64), Vec<&ClusterableFeature>> = BTreeMap::new();
        for feature in features {
            let row = (feature.location.lat() / cell).floor() as i64;
            let col = (feature.location.lon() / cell).floor() as i64;
            cells.entry((row, col)).or_default().push(feature);
        }

        let valid_from = (zoom - self.config.hysteresis).max(0.0);
        let valid_to = (zoom + self.config.hysteresis).min(self.config.max_cluster_zoom);

        let clusters: Vec<Cluster> =
            cells.into_values().map(|members| merge(members, valid_from, valid_to)).collect();

        tracing::debug!(features = features.len(), clusters = clusters.len(), zoom, "clustered features");
        clusters
    }

    fn singletons(&self, features: &[ClusterableFeature]) -> Vec<Cluster> {
        let mut sorted: Vec<&ClusterableFeature> = features.iter().collect();
        sorted.sort_by(|a, b| member_order(a, b));
        sorted
            .into_iter()
            .map(|f| Cluster {
                centroid: f.location,
                member_count: 1,
                max_weight: f.weight,
                zoom_valid_from: self.config.max_cluster_zoom,
                zoom_valid_to: MAX_ZOOM,
                member_ids: vec![f.id.clone()],
            })
            .collect()
    }
}

fn member_order(a: &ClusterableFeature, b: &ClusterableFeature) -> std::cmp::Ordering {
    a.id.cmp(&b.id)
        .then(a.location.lat().total_cmp(&b.location.lat()))
        .then(a.location.lon().total_cmp(&b.location.lon()))
        .then(a.weight.total_cmp(&b.weight))
}

/// Merge one cell. Members are sorted first so the float sums are
/// bit-identical for any input order.
fn merge(mut members: Vec<&ClusterableFeature>, valid_from: f64, valid_to: f64) -> Cluster {
    members.sort_by(|a, b| member_order(a, b));

    let weight_of = |f: &ClusterableFeature| if f.weight.is_finite() { f.weight.max(0.0) } else { 0.0 };
    let total: f64 = members.iter().map(|f| weight_of(f)).sum();

    let (lat, lon) = if total > 0.0 {
        let lat = members.iter().map(|f| f.location.lat() * weight_of(f)).sum::<f64>() / total;
        let lon = members.iter().map(|f| f.location.lon() * weight_of(f)).sum::<f64>() / total;
        (lat, lon)
    } else {
        let n = members.len() as f64;
        let lat = members.iter().map(|f| f.location.lat()).sum::<f64>() / n;
        let lon = members.iter().map(|f| f.location.lon()).sum::<f64>() / n;
        (lat, lon)
    };

    let first = members[0].location;
    let centroid = GeoPoint::new(lat, lon).unwrap_or(first);
    let max_weight = members.iter().map(|f| f.weight).fold(f64::NEG_INFINITY, f64::max);

    Cluster {
        centroid,
        member_count: members.len(),
        max_weight,
        zoom_valid_from: valid_from,
        zoom_valid_to: valid_to,
        member_ids: members.iter().map(|f| f.id.clone()).collect(),
    }
}
