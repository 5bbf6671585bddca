//! Hazard payloads served by the tiers.
//!
//! - [`HotspotSet`]: active fire detections (points)
//! - [`BurntAreaSet`]: burnt-area polygons, clustered by centroid

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hazardmap_core::cluster::{ClusterableFeature, FeatureSource};
use hazardmap_core::geo::{BoundingBox, GeoPoint};
use serde::{Deserialize, Serialize};

/// One active fire detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Fire radiative power in MW.
    pub intensity: f64,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotspotSet {
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
}

impl HotspotSet {
    pub fn len(&self) -> usize {
        self.hotspots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotspots.is_empty()
    }
}

impl FeatureSource for HotspotSet {
    fn features(&self) -> Vec<ClusterableFeature> {
        self.hotspots
            .iter()
            .filter_map(|h| match GeoPoint::new(h.lat, h.lon) {
                Ok(location) => Some(ClusterableFeature {
                    id: h.id.clone(),
                    location,
                    weight: h.intensity,
                    timestamp: h.detected_at,
                }),
                Err(e) => {
                    tracing::warn!(id = %h.id, error = %e, "skipping hotspot with invalid position");
                    None
                }
            })
            .collect()
    }
}

/// A burnt-area polygon. Coordinates are `[lon, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurntArea {
    pub id: String,
    #[serde(default)]
    pub centroid: Option<[f64; 2]>,
    pub boundary_points: Vec<[f64; 2]>,
    #[serde(default)]
    pub area_hectares: f64,
    #[serde(default)]
    pub fire_date: Option<String>,
    pub season_year: i32,
}

impl BurntArea {
    /// Minimum vertex count of a usable polygon.
    pub const MIN_BOUNDARY_POINTS: usize = 3;

    /// Stored centroid, or the mean of the boundary vertices.
    pub fn centroid_lon_lat(&self) -> Option<[f64; 2]> {
        if let Some(c) = self.centroid {
            return Some(c);
        }
        if self.boundary_points.is_empty() {
            return None;
        }
        let n = self.boundary_points.len() as f64;
        let lon = self.boundary_points.iter().map(|p| p[0]).sum::<f64>() / n;
        let lat = self.boundary_points.iter().map(|p| p[1]).sum::<f64>() / n;
        Some([lon, lat])
    }

    pub fn location(&self) -> Option<GeoPoint> {
        let [lon, lat] = self.centroid_lon_lat()?;
        GeoPoint::new(lat, lon).ok()
    }

    /// Fire date at midnight UTC, else January 1st of the season.
    pub fn observed_at(&self) -> DateTime<Utc> {
        let date = self
            .fire_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.get(..10).unwrap_or(d), "%Y-%m-%d").ok())
            .or_else(|| NaiveDate::from_ymd_opt(self.season_year, 1, 1));
        date.and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurntAreaSet {
    #[serde(default)]
    pub features: Vec<BurntArea>,
}

impl BurntAreaSet {
    /// Features whose centroid lies inside `bounds`.
    pub fn clipped(features: impl IntoIterator<Item = BurntArea>, bounds: &BoundingBox) -> Self {
        let features = features.into_iter().filter(|f| f.location().is_some_and(|p| bounds.contains(&p))).collect();
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FeatureSource for BurntAreaSet {
    fn features(&self) -> Vec<ClusterableFeature> {
        self.features
            .iter()
            .filter_map(|f| {
                let location = f.location()?;
                Some(ClusterableFeature {
                    id: f.id.clone(),
                    location,
                    weight: f.area_hectares,
                    timestamp: f.observed_at(),
                })
            })
            .collect()
    }
}
