//! Deterministic demo hotspots.
//!
//! Points are derived from a SHA-256 digest of the query class and bounding
//! box, so the same viewport always shows the same demo data. Every hotspot
//! is marked with the `synthetic` confidence and a `demo-` id prefix.

use std::sync::Arc;

use chrono::{DurationRound, TimeDelta};
use hazardmap_core::clock::Clock;
use hazardmap_core::resolve::{HazardQuery, RemoteError, SyntheticSource};
use sha2::{Digest, Sha256};

use crate::hazards::{Hotspot, HotspotSet};

pub const SYNTHETIC_CONFIDENCE: &str = "synthetic";

const MIN_POINTS: usize = 8;
const MAX_EXTRA_POINTS: u8 = 8;

/// Synthetic fallback producing [`HotspotSet`]s.
pub struct DemoHotspots {
    clock: Arc<dyn Clock>,
}

impl DemoHotspots {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn seed(query: &HazardQuery) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(query.query_class.as_bytes());
        hasher.update(b"|");
        hasher.update(query.bounds.to_query_param().as_bytes());
        hasher.finalize().into()
    }
}

/// A fraction in [0, 1) from eight digest bytes.
fn unit(bytes: &[u8]) -> f64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[..8]);
    (u64::from_be_bytes(word) >> 11) as f64 / (1u64 << 53) as f64
}

impl SyntheticSource<HotspotSet> for DemoHotspots {
    fn generate(&self, query: &HazardQuery) -> Result<HotspotSet, RemoteError> {
        let seed = Self::seed(query);
        let tag = hex::encode(&seed[..4]);
        let count = MIN_POINTS + usize::from(seed[0] % MAX_EXTRA_POINTS);

        let now = self.clock.now();
        let hour = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
        let b = &query.bounds;

        let hotspots = (0..count)
            .map(|i| {
                let mut hasher = Sha256::new();
                hasher.update(seed);
                hasher.update((i as u32).to_be_bytes());
                let digest = hasher.finalize();

                Hotspot {
                    id: format!("demo-{tag}-{i}"),
                    lat: b.min_lat + unit(&digest[0..8]) * (b.max_lat - b.min_lat),
                    lon: b.min_lon + unit(&digest[8..16]) * (b.max_lon - b.min_lon),
                    intensity: 1.0 + unit(&digest[16..24]) * 99.0,
                    detected_at: hour - TimeDelta::minutes(i64::from(digest[24] % 60)),
                    confidence: Some(SYNTHETIC_CONFIDENCE.to_string()),
                }
            })
            .collect();

        Ok(HotspotSet { hotspots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazardmap_core::clock::ManualClock;
    use hazardmap_core::geo::{BoundingBox, GeoPoint};

    fn demo() -> DemoHotspots {
        DemoHotspots::new(Arc::new(ManualClock::at_origin()))
    }

    fn query(bounds: BoundingBox) -> HazardQuery {
        HazardQuery::new("hotspots", bounds)
    }

    #[test]
    fn test_same_viewport_same_points() {
        let bounds = BoundingBox::new(49.0, -12.0, 62.0, 3.0).unwrap();
        let a = demo().generate(&query(bounds)).unwrap();
        let b = demo().generate(&query(bounds)).unwrap();
        assert_eq!(a, b);
        assert!((MIN_POINTS..MIN_POINTS + MAX_EXTRA_POINTS as usize).contains(&a.len()));
    }

    #[test]
    fn test_different_viewport_different_points() {
        let a = demo().generate(&query(BoundingBox::new(49.0, -12.0, 62.0, 3.0).unwrap())).unwrap();
        let b = demo().generate(&query(BoundingBox::new(36.0, -9.5, 43.8, 3.3).unwrap())).unwrap();
        assert_ne!(a.hotspots[0].id, b.hotspots[0].id);
    }

    #[test]
    fn test_points_inside_bounds_and_labeled() {
        let bounds = BoundingBox::new(51.0, -1.0, 52.0, 0.5).unwrap();
        let set = demo().generate(&query(bounds)).unwrap();
        for h in &set.hotspots {
            assert!(bounds.contains(&GeoPoint::new(h.lat, h.lon).unwrap()), "{h:?}");
            assert!(h.id.starts_with("demo-"));
            assert_eq!(h.confidence.as_deref(), Some(SYNTHETIC_CONFIDENCE));
            assert!((1.0..100.0).contains(&h.intensity));
        }
    }
}
