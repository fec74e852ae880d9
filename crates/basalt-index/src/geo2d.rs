use std::collections::{BTreeSet, HashMap};

use basalt_core::{Document, Value};

use crate::DocId;

/// Planar grid index over a single point field.
///
/// Points land in fixed-size square cells; proximity queries walk cells
/// in expanding rings around the center.
#[derive(Debug)]
pub struct Geo2dIndex {
    name: String,
    field: String,
    cell_size: f64,
    cells: HashMap<(i64, i64), BTreeSet<DocId>>,
    points: HashMap<DocId, (f64, f64)>,
}

/// A proximity hit with its distance in the query's units.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoHit {
    pub id: DocId,
    pub distance: f64,
}

pub const DEFAULT_CELL_SIZE: f64 = 1.0;

impl Geo2dIndex {
    pub fn new(name: impl Into<String>, field: impl Into<String>, cell_size: f64) -> Geo2dIndex {
        Geo2dIndex {
            name: name.into(),
            field: field.into(),
            cell_size: if cell_size > 0.0 {
                cell_size
            } else {
                DEFAULT_CELL_SIZE
            },
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

    fn cell_of(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    pub fn insert_doc(&mut self, id: &str, doc: &Document) {
        let Some((x, y)) = doc.get(&self.field).and_then(extract_point_xy) else {
            return;
        };
        self.points.insert(id.to_string(), (x, y));
        self.cells
            .entry(self.cell_of(x, y))
            .or_default()
            .insert(id.to_string());
    }

    pub fn remove_doc(&mut self, id: &str) {
        if let Some((x, y)) = self.points.remove(id) {
            let cell = self.cell_of(x, y);
            if let Some(ids) = self.cells.get_mut(&cell) {
                ids.remove(id);
                if ids.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Nearest points by Euclidean distance, walking cell rings outward
    /// until no further ring can qualify. Very wide searches stop
    /// expanding and sweep the remaining points directly.
    pub fn near(&self, x: f64, y: f64, max_distance: Option<f64>, limit: Option<usize>) -> Vec<GeoHit> {
        const MAX_RINGS: i64 = 512;

        let mut hits: Vec<GeoHit> = Vec::new();
        let center = self.cell_of(x, y);
        let mut seen = 0usize;
        let mut ring = 0i64;

        loop {
            if ring > MAX_RINGS {
                hits = self.sweep_all(x, y, max_distance);
                break;
            }
            // Any cell in this ring is at least this far from the center
            // point; once that exceeds every remaining budget, stop.
            let ring_floor = (ring - 1).max(0) as f64 * self.cell_size;
            if let Some(max) = max_distance {
                if ring_floor > max {
                    break;
                }
            }
            if let Some(limit) = limit {
                if hits.len() >= limit {
                    let worst = hits
                        .iter()
                        .map(|h| h.distance)
                        .fold(f64::NEG_INFINITY, f64::max);
                    if ring_floor > worst {
                        break;
                    }
                }
            }

            for cell in ring_cells(center, ring) {
                let Some(ids) = self.cells.get(&cell) else {
                    continue;
                };
                for id in ids {
                    seen += 1;
                    let (px, py) = self.points[id];
                    let distance = ((px - x).powi(2) + (py - y).powi(2)).sqrt();
                    if max_distance.is_some_and(|max| distance > max) {
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
            ring += 1;
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

    fn sweep_all(&self, x: f64, y: f64, max_distance: Option<f64>) -> Vec<GeoHit> {
        self.points
            .iter()
            .filter_map(|(id, (px, py))| {
                let distance = ((px - x).powi(2) + (py - y).powi(2)).sqrt();
                if max_distance.is_some_and(|max| distance > max) {
                    return None;
                }
                Some(GeoHit {
                    id: id.clone(),
                    distance,
                })
            })
            .collect()
    }

    /// Ids of points inside the polygon: candidate cells from the
    /// polygon's bounding box, then a pointwise test.
    pub fn within(&self, polygon: &[(f64, f64)]) -> Vec<DocId> {
        if polygon.len() < 3 {
            return Vec::new();
        }
        let min_x = polygon.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = polygon.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = polygon.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = polygon.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let lo = self.cell_of(min_x, min_y);
        let hi = self.cell_of(max_x, max_y);

        let mut out = Vec::new();
        for cx in lo.0..=hi.0 {
            for cy in lo.1..=hi.1 {
                let Some(ids) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for id in ids {
                    let (px, py) = self.points[id];
                    if point_in_polygon((px, py), polygon) {
                        out.push(id.clone());
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

/// All cells at Chebyshev distance `ring` from the center cell.
fn ring_cells(center: (i64, i64), ring: i64) -> Vec<(i64, i64)> {
    if ring == 0 {
        return vec![center];
    }
    let mut cells = Vec::with_capacity((ring as usize) * 8);
    for dx in -ring..=ring {
        cells.push((center.0 + dx, center.1 - ring));
        cells.push((center.0 + dx, center.1 + ring));
    }
    for dy in (-ring + 1)..ring {
        cells.push((center.0 - ring, center.1 + dy));
        cells.push((center.0 + ring, center.1 + dy));
    }
    cells
}

/// Read a planar point from `[x, y]` or `{ "x": ..., "y": ... }`.
pub(crate) fn extract_point_xy(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Array(items) if items.len() == 2 => {
            Some((items[0].as_f64()?, items[1].as_f64()?))
        }
        Value::Document(doc) => Some((doc.get_f64("x")?, doc.get_f64("y")?)),
        _ => None,
    }
}

/// Ray-cast containment test; boundary points count as inside.
pub(crate) fn point_in_polygon(point: (f64, f64), polygon: &[(f64, f64)]) -> bool {
    let (px, py) = point;
    let n = polygon.len();
    let mut inside = false;

    for i in 0..n {
        let (x1, y1) = polygon[i];
        let (x2, y2) = polygon[(i + 1) % n];

        // On-edge check: collinear and within the segment's bounding box.
        let cross = (x2 - x1) * (py - y1) - (y2 - y1) * (px - x1);
        if cross.abs() < 1e-12
            && px >= x1.min(x2) - 1e-12
            && px <= x1.max(x2) + 1e-12
            && py >= y1.min(y2) - 1e-12
            && py <= y1.max(y2) + 1e-12
        {
            return true;
        }

        if (y1 > py) != (y2 > py) {
            let x_cross = x1 + (py - y1) / (y2 - y1) * (x2 - x1);
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
