//! Minimal geohash cells for the 2dsphere index: base32 encoding,
//! bounding boxes, and grid neighbors.

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// A cell's latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl CellBounds {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }
}

/// Encode a point into a geohash cell of the given precision.
pub fn encode(lat: f64, lng: f64, precision: usize) -> String {
    let lat = lat.clamp(-90.0, 90.0);
    let lng = normalize_lng(lng);

    let (mut lat_lo, mut lat_hi) = (-90.0f64, 90.0f64);
    let (mut lng_lo, mut lng_hi) = (-180.0f64, 180.0f64);
    let mut hash = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut bit_count = 0u8;
    let mut even_bit = true;

    while hash.len() < precision {
        if even_bit {
            let mid = (lng_lo + lng_hi) / 2.0;
            if lng >= mid {
                bits = (bits << 1) | 1;
                lng_lo = mid;
            } else {
                bits <<= 1;
                lng_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if lat >= mid {
                bits = (bits << 1) | 1;
                lat_lo = mid;
            } else {
                bits <<= 1;
                lat_hi = mid;
            }
        }
        even_bit = !even_bit;
        bit_count += 1;
        if bit_count == 5 {
            hash.push(BASE32[bits as usize] as char);
            bits = 0;
            bit_count = 0;
        }
    }
    hash
}

/// Decode a geohash cell into its bounding box.
pub fn decode_bounds(hash: &str) -> CellBounds {
    let (mut lat_lo, mut lat_hi) = (-90.0f64, 90.0f64);
    let (mut lng_lo, mut lng_hi) = (-180.0f64, 180.0f64);
    let mut even_bit = true;

    for ch in hash.bytes() {
        let idx = BASE32.iter().position(|b| *b == ch).unwrap_or(0) as u8;
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1;
            if even_bit {
                let mid = (lng_lo + lng_hi) / 2.0;
                if bit == 1 {
                    lng_lo = mid;
                } else {
                    lng_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit == 1 {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even_bit = !even_bit;
        }
    }

    CellBounds {
        min_lat: lat_lo,
        max_lat: lat_hi,
        min_lng: lng_lo,
        max_lng: lng_hi,
    }
}

/// The eight surrounding cells at the same precision, derived by stepping
/// one cell span from the center and re-encoding. Steps past the poles
/// are dropped; longitude wraps.
pub fn neighbors(hash: &str) -> Vec<String> {
    let bounds = decode_bounds(hash);
    let (lat, lng) = bounds.center();
    let dlat = bounds.lat_span();
    let dlng = bounds.lng_span();
    let precision = hash.len();

    let mut out = Vec::with_capacity(8);
    for dy in [-1.0f64, 0.0, 1.0] {
        for dx in [-1.0f64, 0.0, 1.0] {
            if dy == 0.0 && dx == 0.0 {
                continue;
            }
            let n_lat = lat + dy * dlat;
            if !(-90.0..=90.0).contains(&n_lat) {
                continue;
            }
            let n_lng = normalize_lng(lng + dx * dlng);
            let neighbor = encode(n_lat, n_lng, precision);
            if neighbor != hash && !out.contains(&neighbor) {
                out.push(neighbor);
            }
        }
    }
    out
}

fn normalize_lng(lng: f64) -> f64 {
    let mut lng = lng;
    while lng < -180.0 {
        lng += 360.0;
    }
    while lng >= 180.0 {
        lng -= 360.0;
    }
    lng
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_known_cells() {
        // Reference values from the public geohash scheme.
        assert_eq!(encode(57.64911, 10.40744, 6), "u4pruy");
        assert_eq!(encode(48.669, -4.329, 5), "gbsuv");
    }

    #[test]
    fn decode_contains_encoded_point() {
        let hash = encode(37.7749, -122.4194, 6);
        let bounds = decode_bounds(&hash);
        assert!(bounds.min_lat <= 37.7749 && 37.7749 <= bounds.max_lat);
        assert!(bounds.min_lng <= -122.4194 && -122.4194 <= bounds.max_lng);
    }

    #[test]
    fn neighbors_are_adjacent_distinct_cells() {
        let hash = encode(10.0, 10.0, 5);
        let around = neighbors(&hash);
        assert_eq!(around.len(), 8);
        assert!(!around.contains(&hash));
        for n in &around {
            assert_eq!(n.len(), hash.len());
        }
    }

    #[test]
    fn near_pole_has_fewer_neighbors() {
        let hash = encode(89.99, 0.0, 3);
        let around = neighbors(&hash);
        assert!(around.len() < 8);
    }

    #[test]
    fn longitude_wraps() {
        let hash = encode(0.0, 179.99, 4);
        let around = neighbors(&hash);
        // Wrapping across the antimeridian still yields valid cells.
        assert!(!around.is_empty());
        for n in &around {
            let b = decode_bounds(n);
            assert!(b.min_lng >= -180.0 && b.max_lng <= 180.0);
        }
    }
}
