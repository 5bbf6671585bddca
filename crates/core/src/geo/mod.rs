//! Geographic value types and the geohash codec.

pub mod geohash;

use crate::Error;
use serde::{Deserialize, Serialize};

pub use geohash::{decode_bounds, decode_center, encode, is_valid, neighbors};

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A validated WGS84 coordinate.
///
/// Fields are private so every instance has passed range validation,
/// including ones that arrive through serde.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawPoint {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawPoint> for GeoPoint {
    type Error = Error;

    fn try_from(raw: RawPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.lat, raw.lon)
    }
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, Error> {
        if !(MIN_LAT..=MAX_LAT).contains(&lat) || !(MIN_LON..=MAX_LON).contains(&lon) {
            return Err(Error::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// An axis-aligned lat/lon rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Build a box, rejecting inverted or out-of-range corners.
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self, Error> {
        GeoPoint::new(min_lat, min_lon)?;
        GeoPoint::new(max_lat, max_lon)?;
        if min_lat > max_lat || min_lon > max_lon {
            return Err(Error::InvalidInput(format!(
                "inverted bounding box: ({min_lat}, {min_lon}) .. ({max_lat}, {max_lon})"
            )));
        }
        Ok(Self { min_lat, min_lon, max_lat, max_lon })
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint { lat: (self.min_lat + self.max_lat) / 2.0, lon: (self.min_lon + self.max_lon) / 2.0 }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat) && (self.min_lon..=self.max_lon).contains(&point.lon)
    }

    /// `minLon,minLat,maxLon,maxLat`, the order WFS/WMS style endpoints expect.
    pub fn to_query_param(&self) -> String {
        format!("{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_geo_point_deserialize_validates() {
        let ok: Result<GeoPoint, _> = serde_json::from_str(r#"{"lat":51.5,"lon":-0.12}"#);
        assert!(ok.is_ok());

        let bad: Result<GeoPoint, _> = serde_json::from_str(r#"{"lat":151.5,"lon":-0.12}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_bounding_box_center_and_contains() {
        let bbox = BoundingBox::new(49.0, -12.0, 62.0, 3.0).unwrap();
        let center = bbox.center();
        assert_eq!(center.lat(), 55.5);
        assert_eq!(center.lon(), -4.5);
        assert!(bbox.contains(&center));
        assert!(!bbox.contains(&GeoPoint::new(40.0, 0.0).unwrap()));
    }

    #[test]
    fn test_bounding_box_rejects_inverted() {
        assert!(BoundingBox::new(10.0, 0.0, 5.0, 1.0).is_err());
    }

    #[test]
    fn test_bounding_box_query_param() {
        let bbox = BoundingBox::new(49.0, -12.0, 62.0, 3.0).unwrap();
        assert_eq!(bbox.to_query_param(), "-12,49,3,62");
    }
}
