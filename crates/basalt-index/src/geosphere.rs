use std::collections::{BTreeSet, HashMap, HashSet};

use basalt_core::{Document, Value};
use geoutils::Location;

use crate::DocId;
use crate::geo2d::{GeoHit, point_in_polygon};
use crate::geohash;

/// Geohash-cell index over a single point field, with distances in
/// meters over WGS84.
///
/// Points are `(lng, lat)` pairs; proximity queries expand geohash
/// neighborhoods outward from the center cell.
#[derive(Debug)]
pub struct Geo2dSphereIndex {
    name: String,
    field: String,
    precision: usize,
    cells: HashMap<String, BTreeSet<DocId>>,
    points: HashMap<DocId, (f64, f64)>,
}

pub const DEFAULT_PRECISION: usize = 6;

impl Geo2dSphereIndex {
    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        precision: usize,
    ) -> Geo2dSphereIndex {
        Geo2dSphereIndex {
            name: name.into(),
            field: field.into(),
            precision: precision.clamp(1, 12),
            cells: HashMap::new(),
            points: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn insert_doc(&mut self, id: &str, doc: &Document) {
        let Some((lng, lat)) = doc.get(&self.field).and_then(extract_point_lnglat) else {
            return;
        };
        let cell = geohash::encode(lat, lng, self.precision);
        self.points.insert(id.to_string(), (lng, lat));
        self.cells.entry(cell).or_default().insert(id.to_string());
    }

    pub fn remove_doc(&mut self, id: &str) {
        if let Some((lng, lat)) = self.points.remove(id) {
            let cell = geohash::encode(lat, lng, self.precision);
            if let Some(ids) = self.cells.get_mut(&cell) {
                ids.remove(id);
                if ids.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Nearest points by haversine distance in meters, expanding geohash
    /// neighborhoods until no further shell can qualify. Once the
    /// expansion outgrows its usefulness the remaining points are swept
    /// directly.
    pub fn near(
        &self,
        lng: f64,
        lat: f64,
        max_meters: Option<f64>,
        limit: Option<usize>,
    ) -> Vec<GeoHit> {
        const MAX_SHELLS: usize = 32;

        if self.points.is_empty() {
            return Vec::new();
        }

        let center = Location::new(lat, lng);
        let center_cell = geohash::encode(lat, lng, self.precision);

        // Conservative meters-per-shell estimate from the center cell's
        // smaller dimension.
        let bounds = geohash::decode_bounds(&center_cell);
        let (c_lat, c_lng) = bounds.center();
        let lat_m = distance_m(c_lat, c_lng, c_lat + bounds.lat_span(), c_lng);
        let lng_m = distance_m(c_lat, c_lng, c_lat, c_lng + bounds.lng_span());
        let shell_m = lat_m.min(lng_m).max(1.0);

        let mut hits: Vec<GeoHit> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = vec![center_cell];
        visited.insert(frontier[0].clone());
        let mut seen = 0usize;
        let mut shell = 0usize;

        loop {
            let shell_floor = shell.saturating_sub(1) as f64 * shell_m;
            if let Some(max) = max_meters {
                if shell_floor > max {
                    break;
                }
            }
            if let Some(limit) = limit {
                if hits.len() >= limit {
                    let worst = hits
                        .iter()
                        .map(|h| h.distance)
                        .fold(f64::NEG_INFINITY, f64::max);
                    if shell_floor > worst {
                        break;
                    }
                }
            }

            for cell in &frontier {
                let Some(ids) = self.cells.get(cell) else {
                    continue;
                };
                for id in ids {
                    seen += 1;
                    let (p_lng, p_lat) = self.points[id];
                    let distance = center
                        .haversine_distance_to(&Location::new(p_lat, p_lng))
                        .meters();
                    if max_meters.is_some_and(|max| distance > max) {
                        continue;
                    }
                    hits.push(GeoHit {
                        id: id.clone(),
                        distance,
                    });
                }
            }

            if seen >= self.points.len() {
                break;
            }
            if shell >= MAX_SHELLS {
                hits = self.sweep_all(&center, max_meters);
                break;
            }

            // Next shell: unvisited neighbors of the current frontier.
            let mut next: Vec<String> = Vec::new();
            for cell in &frontier {
                for neighbor in geohash::neighbors(cell) {
                    if visited.insert(neighbor.clone()) {
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
            shell += 1;
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        hits
    }

    fn sweep_all(&self, center: &Location, max_meters: Option<f64>) -> Vec<GeoHit> {
        self.points
            .iter()
            .filter_map(|(id, (p_lng, p_lat))| {
                let distance = center
                    .haversine_distance_to(&Location::new(*p_lat, *p_lng))
                    .meters();
                if max_meters.is_some_and(|max| distance > max) {
                    return None;
                }
                Some(GeoHit {
                    id: id.clone(),
                    distance,
                })
            })
            .collect()
    }

    /// Points inside a polygon of `(lng, lat)` vertices.
    pub fn within(&self, polygon: &[(f64, f64)]) -> Vec<DocId> {
        if polygon.len() < 3 {
            return Vec::new();
        }
        let mut out: Vec<DocId> = self
            .points
            .iter()
            .filter(|(_, (lng, lat))| point_in_polygon((*lng, *lat), polygon))
            .map(|(id, _)| id.clone())
            .collect();
        out.sort_unstable();
        out
    }

    /// For point data, intersection with a polygon is containment
    /// including the boundary.
    pub fn intersects(&self, polygon: &[(f64, f64)]) -> Vec<DocId> {
        self.within(polygon)
    }
}

fn distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    Location::new(lat1, lng1)
        .haversine_distance_to(&Location::new(lat2.clamp(-90.0, 90.0), lng2))
        .meters()
}

/// Read a spherical point from `[lng, lat]`, GeoJSON
/// `{ "type": "Point", "coordinates": [lng, lat] }`, or
/// `{ "lng": ..., "lat": ... }`.
pub(crate) fn extract_point_lnglat(value: &Value) -> Option<(f64, f64)> {
    let (lng, lat) = match value {
        Value::Array(items) if items.len() == 2 => {
            (items[0].as_f64()?, items[1].as_f64()?)
        }
        Value::Document(doc) => {
            if let Some(coords) = doc.get_array("coordinates") {
                if doc.get_str("type") != Some("Point") || coords.len() != 2 {
                    return None;
                }
                (coords[0].as_f64()?, coords[1].as_f64()?)
            } else {
                (doc.get_f64("lng")?, doc.get_f64("lat")?)
            }
        }
        _ => return None,
    };
    if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
        return None;
    }
    Some((lng, lat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::doc;

    // Approximate city coordinates as (lng, lat).
    const BERLIN: (f64, f64) = (13.405, 52.52);
    const POTSDAM: (f64, f64) = (13.0645, 52.3906);
    const MUNICH: (f64, f64) = (11.582, 48.1351);
    const LISBON: (f64, f64) = (-9.1393, 38.7223);

    fn seeded() -> Geo2dSphereIndex {
        let mut idx = Geo2dSphereIndex::new("loc_2dsphere", "loc", DEFAULT_PRECISION);
        for (id, (lng, lat)) in [
            ("berlin", BERLIN),
            ("potsdam", POTSDAM),
            ("munich", MUNICH),
            ("lisbon", LISBON),
        ] {
            idx.insert_doc(id, &doc! { "loc": [(lng), (lat)] });
        }
        idx
    }

    #[test]
    fn near_orders_by_meters() {
        let idx = seeded();
        let hits = idx.near(BERLIN.0, BERLIN.1, None, Some(3));
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["berlin", "potsdam", "munich"]);
        // Berlin → Potsdam is roughly 27 km.
        assert!((20_000.0..40_000.0).contains(&hits[1].distance));
    }

    #[test]
    fn near_respects_max_meters() {
        let idx = seeded();
        let hits = idx.near(BERLIN.0, BERLIN.1, Some(100_000.0), None);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["berlin", "potsdam"]);
    }

    #[test]
    fn geojson_point_form() {
        let mut idx = Geo2dSphereIndex::new("loc_2dsphere", "loc", DEFAULT_PRECISION);
        idx.insert_doc(
            "a",
            &doc! { "loc": { "type": "Point", "coordinates": [(MUNICH.0), (MUNICH.1)] } },
        );
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.near(MUNICH.0, MUNICH.1, Some(1_000.0), None)[0].id, "a");
    }

    #[test]
    fn out_of_range_coordinates_rejected() {
        let mut idx = Geo2dSphereIndex::new("loc_2dsphere", "loc", DEFAULT_PRECISION);
        idx.insert_doc("bad", &doc! { "loc": [200.0, 10.0] });
        idx.insert_doc("worse", &doc! { "loc": [10.0, 95.0] });
        assert!(idx.is_empty());
    }

    #[test]
    fn within_germany_box() {
        let idx = seeded();
        // A rough lon/lat box around Germany.
        let ring = [(5.0, 47.0), (15.5, 47.0), (15.5, 55.0), (5.0, 55.0)];
        assert_eq!(idx.within(&ring), vec!["berlin", "munich", "potsdam"]);
    }

    #[test]
    fn remove_doc_clears_point() {
        let mut idx = seeded();
        idx.remove_doc("berlin");
        let hits = idx.near(BERLIN.0, BERLIN.1, Some(1_000.0), None);
        assert!(hits.is_empty());
    }
}
