//! Geohash encoding and decoding.
//!
//! Standard base32 geohash: bits alternate longitude/latitude starting with
//! longitude, five bits per character. All functions are pure.

use super::{BoundingBox, GeoPoint, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};
use crate::Error;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const MIN_PRECISION: usize = 1;
pub const MAX_PRECISION: usize = 12;

fn char_index(c: u8) -> Option<u8> {
    BASE32.iter().position(|&b| b == c).map(|i| i as u8)
}

/// Encode a coordinate at `precision` characters.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String, Error> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(Error::InvalidPrecision(precision));
    }
    GeoPoint::new(lat, lon)?;

    let (mut lat_lo, mut lat_hi) = (MIN_LAT, MAX_LAT);
    let (mut lon_lo, mut lon_hi) = (MIN_LON, MAX_LON);
    let mut hash = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0u8;
    let mut idx = 0u8;

    while hash.len() < precision {
        if even {
            let mid = (lon_lo + lon_hi) / 2.0;
            if lon >= mid {
                idx = (idx << 1) | 1;
                lon_lo = mid;
            } else {
                idx <<= 1;
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if lat >= mid {
                idx = (idx << 1) | 1;
                lat_lo = mid;
            } else {
                idx <<= 1;
                lat_hi = mid;
            }
        }
        even = !even;

        bits += 1;
        if bits == 5 {
            hash.push(BASE32[idx as usize] as char);
            bits = 0;
            idx = 0;
        }
    }

    Ok(hash)
}

/// Whether `geohash` is a non-empty, lowercase base32 string of at most 12 chars.
pub fn is_valid(geohash: &str) -> bool {
    (MIN_PRECISION..=MAX_PRECISION).contains(&geohash.len()) && geohash.bytes().all(|c| char_index(c).is_some())
}

/// The cell rectangle a geohash denotes.
pub fn decode_bounds(geohash: &str) -> Result<BoundingBox, Error> {
    if !is_valid(geohash) {
        return Err(Error::InvalidGeohash(geohash.to_string()));
    }

    let (mut lat_lo, mut lat_hi) = (MIN_LAT, MAX_LAT);
    let (mut lon_lo, mut lon_hi) = (MIN_LON, MAX_LON);
    let mut even = true;

    for c in geohash.bytes() {
        let idx = char_index(c).ok_or_else(|| Error::InvalidGeohash(geohash.to_string()))?;
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1;
            if even {
                let mid = (lon_lo + lon_hi) / 2.0;
                if bit == 1 {
                    lon_lo = mid;
                } else {
                    lon_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit == 1 {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even = !even;
        }
    }

    Ok(BoundingBox { min_lat: lat_lo, min_lon: lon_lo, max_lat: lat_hi, max_lon: lon_hi })
}

/// The center point of a geohash cell.
pub fn decode_center(geohash: &str) -> Result<GeoPoint, Error> {
    Ok(decode_bounds(geohash)?.center())
}

/// The eight cells surrounding `geohash`, clockwise from north:
/// `[N, NE, E, SE, S, SW, W, NW]`.
///
/// Longitude wraps across the antimeridian. Latitude clamps at the poles, so a
/// polar cell reports itself (or its east/west neighbor) beyond the pole.
pub fn neighbors(geohash: &str) -> Result<[String; 8], Error> {
    let bounds = decode_bounds(geohash)?;
    let precision = geohash.len();
    let center = bounds.center();
    let dlat = bounds.max_lat - bounds.min_lat;
    let dlon = bounds.max_lon - bounds.min_lon;

    let at = |lat_steps: f64, lon_steps: f64| -> Result<String, Error> {
        let lat = (center.lat() + lat_steps * dlat).clamp(MIN_LAT, MAX_LAT);
        let mut lon = center.lon() + lon_steps * dlon;
        if lon > MAX_LON {
            lon -= 360.0;
        } else if lon < MIN_LON {
            lon += 360.0;
        }
        encode(lat, lon, precision)
    };

    Ok([
        at(1.0, 0.0)?,
        at(1.0, 1.0)?,
        at(0.0, 1.0)?,
        at(-1.0, 1.0)?,
        at(-1.0, 0.0)?,
        at(-1.0, -1.0)?,
        at(0.0, -1.0)?,
        at(1.0, -1.0)?,
    ])
}
