//! Named polygon zones and point lookup
//!
//! Zones are loaded once at startup and never change. Lookup walks zones in
//! declaration order and returns the first one containing the point, so
//! overlapping zones resolve deterministically.
//!
//! Vertices are (longitude, latitude) pairs. The axis swap from the
//! (lat, lon) coordinates used everywhere else happens in `locate` only.
//!
//! Boundary convention: `geo::Contains` excludes the boundary, so a point
//! exactly on an edge or vertex is outside that zone.

use crate::domain::{Coordinate, Error, LookupError, Result, ZoneName};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, Contains, Coord, InteriorPoint, Line, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Zone as it appears in configuration: a name and an ordered ring of [lon, lat]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub name: String,
    pub coordinates: Vec<[f64; 2]>,
}

/// Resolves a coordinate to the zone containing it
///
/// Implementations must be safe for unlimited concurrent reads.
pub trait ZoneLocator: Send + Sync {
    fn locate(&self, coordinate: Coordinate) -> std::result::Result<Option<ZoneName>, LookupError>;
}

/// A single named zone
#[derive(Debug, Clone)]
pub struct Zone {
    name: ZoneName,
    boundary: Polygon<f64>,
}

impl Zone {
    pub fn name(&self) -> &ZoneName {
        &self.name
    }

    pub fn boundary(&self) -> &Polygon<f64> {
        &self.boundary
    }

    /// A point guaranteed to be inside the zone (not necessarily the centroid)
    pub fn interior_point(&self) -> Option<Coordinate> {
        let p = self.boundary.interior_point()?;
        Coordinate::new(p.y(), p.x()).ok()
    }

    /// Ring vertices as [lon, lat], closing vertex omitted
    pub fn vertices(&self) -> Vec<[f64; 2]> {
        let ring = &self.boundary.exterior().0;
        let open = ring.len().saturating_sub(1);
        ring[..open].iter().map(|c| [c.x, c.y]).collect()
    }
}

/// Immutable ordered collection of zones
#[derive(Debug, Clone, Default)]
pub struct ZoneSet {
    zones: Vec<Zone>,
}

impl ZoneSet {
    /// Validate definitions and build the zone set
    ///
    /// Fails with `Error::Configuration` on empty or duplicate names and on
    /// rings that are too short, contain out-of-range or repeated vertices,
    /// have zero area, or self-intersect.
    pub fn from_definitions(definitions: Vec<ZoneDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut zones = Vec::with_capacity(definitions.len());

        for def in definitions {
            if def.name.trim().is_empty() {
                return Err(Error::Configuration("zone with empty name".to_string()));
            }
            if !seen.insert(def.name.clone()) {
                return Err(Error::Configuration(format!("duplicate zone name '{}'", def.name)));
            }

            let ring = build_ring(&def)?;
            let boundary = Polygon::new(LineString::from(ring), vec![]);
            if boundary.unsigned_area() <= 0.0 {
                return Err(Error::Configuration(format!("zone '{}' has zero area", def.name)));
            }

            zones.push(Zone { name: ZoneName::new(&def.name), boundary });
        }

        if zones.is_empty() {
            warn!("zone_set_empty");
        }

        let set = Self { zones };
        for (a, b) in set.overlapping_pairs() {
            warn!(first = %a, second = %b, "zones_overlap_first_declared_wins");
        }
        Ok(set)
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.zones.iter().map(|z| z.name.as_str()).collect()
    }

    /// First zone (in declaration order) containing the coordinate
    pub fn lookup(&self, coordinate: Coordinate) -> Option<&ZoneName> {
        let point = Point::new(coordinate.lon(), coordinate.lat());
        self.zones.iter().find(|z| z.boundary.contains(&point)).map(|z| &z.name)
    }

    /// Pairs of zones whose interiors appear to overlap
    ///
    /// Heuristic: a vertex or interior point of one strictly inside the other,
    /// or two edges crossing properly.
    pub fn overlapping_pairs(&self) -> Vec<(ZoneName, ZoneName)> {
        let mut pairs = Vec::new();
        for (i, a) in self.zones.iter().enumerate() {
            for b in &self.zones[i + 1..] {
                if interiors_overlap(&a.boundary, &b.boundary) {
                    pairs.push((a.name.clone(), b.name.clone()));
                }
            }
        }
        pairs
    }
}

impl ZoneLocator for ZoneSet {
    fn locate(&self, coordinate: Coordinate) -> std::result::Result<Option<ZoneName>, LookupError> {
        Ok(self.lookup(coordinate).cloned())
    }
}

/// Validate a definition's vertices and return the open ring as coords
fn build_ring(def: &ZoneDefinition) -> Result<Vec<Coord<f64>>> {
    let mut ring: Vec<Coord<f64>> =
        def.coordinates.iter().map(|&[lon, lat]| Coord { x: lon, y: lat }).collect();

    // Explicitly closed rings are accepted; drop the closing vertex
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }

    if ring.len() < 3 {
        return Err(Error::Configuration(format!(
            "zone '{}' needs at least 3 distinct vertices, got {}",
            def.name,
            ring.len()
        )));
    }

    for c in &ring {
        if Coordinate::new(c.y, c.x).is_err() {
            return Err(Error::Configuration(format!(
                "zone '{}' has vertex out of range: [{}, {}]",
                def.name, c.x, c.y
            )));
        }
    }

    let n = ring.len();
    for i in 0..n {
        if ring[i] == ring[(i + 1) % n] {
            return Err(Error::Configuration(format!(
                "zone '{}' repeats vertex [{}, {}]",
                def.name, ring[i].x, ring[i].y
            )));
        }
    }

    if self_intersects(&ring) {
        return Err(Error::Configuration(format!("zone '{}' is self-intersecting", def.name)));
    }

    Ok(ring)
}

fn edges(ring: &[Coord<f64>]) -> Vec<Line<f64>> {
    let n = ring.len();
    (0..n).map(|i| Line::new(ring[i], ring[(i + 1) % n])).collect()
}

/// Pairwise edge test; O(n²) is fine for hand-written zone rings
fn self_intersects(ring: &[Coord<f64>]) -> bool {
    let edges = edges(ring);
    let n = edges.len();
    for i in 0..n {
        for j in i + 1..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::Collinear { .. }) => return true,
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(LineIntersection::SinglePoint { .. }) => return true,
            }
        }
    }
    false
}

fn interiors_overlap(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    let strictly_inside = |outer: &Polygon<f64>, inner: &Polygon<f64>| {
        inner.exterior().points().any(|p| outer.contains(&p))
            || inner.interior_point().is_some_and(|p| outer.contains(&p))
    };
    if strictly_inside(a, b) || strictly_inside(b, a) {
        return true;
    }
    a.exterior().lines().any(|ea| {
        b.exterior().lines().any(|eb| {
            matches!(
                line_intersection(ea, eb),
                Some(LineIntersection::SinglePoint { is_proper: true, .. })
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(name: &str, min: f64, max: f64) -> ZoneDefinition {
        ZoneDefinition {
            name: name.to_string(),
            coordinates: vec![[min, min], [min, max], [max, max], [max, min]],
        }
    }

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_lookup_inside_and_outside() {
        let zones = ZoneSet::from_definitions(vec![square("Depot", 0.0, 10.0)]).unwrap();
        assert_eq!(zones.lookup(coord(5.0, 5.0)).map(|z| z.as_str()), Some("Depot"));
        assert_eq!(zones.lookup(coord(50.0, 50.0)), None);
        assert_eq!(zones.lookup(coord(-5.0, 5.0)), None);
    }

    #[test]
    fn test_lookup_uses_lon_lat_axis_order() {
        // Wide, short rectangle: lon 0..40, lat 0..10
        let zones = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Strip".to_string(),
            coordinates: vec![[0.0, 0.0], [40.0, 0.0], [40.0, 10.0], [0.0, 10.0]],
        }])
        .unwrap();

        // lat=5, lon=30 is inside; swapping axes (lat=30, lon=5) is not
        assert!(zones.lookup(coord(5.0, 30.0)).is_some());
        assert!(zones.lookup(coord(30.0, 5.0)).is_none());
    }

    #[test]
    fn test_boundary_points_are_outside() {
        let zones = ZoneSet::from_definitions(vec![square("Depot", 0.0, 10.0)]).unwrap();
        // On an edge
        assert_eq!(zones.lookup(coord(0.0, 5.0)), None);
        assert_eq!(zones.lookup(coord(5.0, 10.0)), None);
        // On a vertex
        assert_eq!(zones.lookup(coord(10.0, 10.0)), None);
        assert_eq!(zones.lookup(coord(0.0, 0.0)), None);
        // Just inside
        assert!(zones.lookup(coord(0.000001, 5.0)).is_some());
    }

    #[test]
    fn test_overlap_first_declared_wins() {
        let zones = ZoneSet::from_definitions(vec![
            square("Outer", 0.0, 10.0),
            square("Inner", 2.0, 8.0),
        ])
        .unwrap();
        assert_eq!(zones.lookup(coord(5.0, 5.0)).map(|z| z.as_str()), Some("Outer"));

        let reversed = ZoneSet::from_definitions(vec![
            square("Inner", 2.0, 8.0),
            square("Outer", 0.0, 10.0),
        ])
        .unwrap();
        assert_eq!(reversed.lookup(coord(5.0, 5.0)).map(|z| z.as_str()), Some("Inner"));
        assert_eq!(reversed.lookup(coord(1.0, 1.0)).map(|z| z.as_str()), Some("Outer"));
    }

    #[test]
    fn test_overlapping_pairs_detection() {
        let zones = ZoneSet::from_definitions(vec![
            square("A", 0.0, 10.0),
            square("B", 5.0, 15.0),
            square("C", 20.0, 30.0),
        ])
        .unwrap();
        let pairs = zones.overlapping_pairs();
        assert_eq!(pairs, vec![(ZoneName::new("A"), ZoneName::new("B"))]);
    }

    #[test]
    fn test_adjacent_zones_do_not_overlap() {
        let zones = ZoneSet::from_definitions(vec![
            square("A", 0.0, 10.0),
            ZoneDefinition {
                name: "B".to_string(),
                coordinates: vec![[10.0, 0.0], [10.0, 10.0], [20.0, 10.0], [20.0, 0.0]],
            },
        ])
        .unwrap();
        assert!(zones.overlapping_pairs().is_empty());
    }

    #[test]
    fn test_identical_zones_overlap() {
        let zones =
            ZoneSet::from_definitions(vec![square("A", 0.0, 10.0), square("B", 0.0, 10.0)])
                .unwrap();
        assert_eq!(zones.overlapping_pairs().len(), 1);
    }

    #[test]
    fn test_closed_ring_accepted() {
        let zones = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Closed".to_string(),
            coordinates: vec![[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0], [0.0, 0.0]],
        }])
        .unwrap();
        assert!(zones.lookup(coord(5.0, 5.0)).is_some());
        assert_eq!(zones.zones()[0].vertices().len(), 4);
    }

    #[test]
    fn test_too_few_vertices_rejected() {
        let result = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Line".to_string(),
            coordinates: vec![[0.0, 0.0], [1.0, 1.0]],
        }]);
        assert!(matches!(result, Err(Error::Configuration(_))));

        // Closed triangle with only two distinct vertices
        let result = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Degenerate".to_string(),
            coordinates: vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]],
        }]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_zero_area_rejected() {
        let result = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Collinear".to_string(),
            coordinates: vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]],
        }]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_self_intersecting_rejected() {
        let result = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Bowtie".to_string(),
            coordinates: vec![[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 10.0]],
        }]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_repeated_vertex_rejected() {
        let result = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Stutter".to_string(),
            coordinates: vec![[0.0, 0.0], [0.0, 10.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]],
        }]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_out_of_range_vertex_rejected() {
        let result = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Off".to_string(),
            coordinates: vec![[0.0, 0.0], [0.0, 95.0], [10.0, 10.0]],
        }]);
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "Nan".to_string(),
            coordinates: vec![[0.0, 0.0], [f64::NAN, 5.0], [10.0, 10.0]],
        }]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let result =
            ZoneSet::from_definitions(vec![square("A", 0.0, 1.0), square("A", 5.0, 6.0)]);
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = ZoneSet::from_definitions(vec![square("  ", 0.0, 1.0)]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_empty_zone_set_locates_nothing() {
        let zones = ZoneSet::from_definitions(Vec::new()).unwrap();
        assert!(zones.is_empty());
        assert_eq!(zones.locate(coord(1.0, 1.0)).unwrap(), None);
    }

    #[test]
    fn test_interior_point_is_inside() {
        // Concave "U" shape whose centroid falls in the notch
        let zones = ZoneSet::from_definitions(vec![ZoneDefinition {
            name: "U".to_string(),
            coordinates: vec![
                [0.0, 0.0],
                [0.0, 10.0],
                [3.0, 10.0],
                [3.0, 3.0],
                [7.0, 3.0],
                [7.0, 10.0],
                [10.0, 10.0],
                [10.0, 0.0],
            ],
        }])
        .unwrap();
        let p = zones.zones()[0].interior_point().unwrap();
        assert_eq!(zones.lookup(p).map(|z| z.as_str()), Some("U"));
    }
}
