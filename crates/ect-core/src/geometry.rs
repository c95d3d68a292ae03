//! Minimal planar geometry: points and simple polygons.
//!
//! Geometries come from text in three shapes: a coordinate pair
//! `"lon, lat"`, a bounding box `"lon1, lat1, lon2, lat2"`, or WKT
//! (`POINT (x y)`, `POLYGON ((x y, ...))`).

use std::fmt;

/// Tolerance used for on-boundary tests.
const EPS: f64 = 1e-12;

/// A planar geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point { x: f64, y: f64 },
    /// Exterior ring without the repeated closing vertex.
    Polygon(Vec<(f64, f64)>),
}

/// Where a point lies relative to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Inside,
    Boundary,
    Outside,
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point { x, y }
    }

    /// Axis-aligned box from two corners.
    pub fn bbox(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let (min_x, max_x) = (x1.min(x2), x1.max(x2));
        let (min_y, max_y) = (y1.min(y2), y1.max(y2));
        Geometry::Polygon(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
        ])
    }

    /// Build a polygon, dropping a closing vertex equal to the first one.
    pub fn polygon(mut ring: Vec<(f64, f64)>) -> Result<Self, String> {
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(format!(
                "a polygon needs at least 3 distinct vertices, got {}",
                ring.len()
            ));
        }
        Ok(Geometry::Polygon(ring))
    }

    /// Build a geometry from 2 (point) or 4 (box) numbers.
    pub fn from_coords(coords: &[f64]) -> Result<Self, String> {
        match coords {
            [x, y] => Ok(Geometry::point(*x, *y)),
            [x1, y1, x2, y2] => Ok(Geometry::bbox(*x1, *y1, *x2, *y2)),
            _ => Err(format!(
                "expected 2 (point) or 4 (box) coordinates, got {}",
                coords.len()
            )),
        }
    }

    /// Parse a coordinate list or WKT text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty geometry text".into());
        }
        if text.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return parse_wkt(text);
        }
        let coords = text
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|_| format!("invalid coordinate '{}' in '{}'", part.trim(), text))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_coords(&coords)
    }

    pub fn to_wkt(&self) -> String {
        match self {
            Geometry::Point { x, y } => format!("POINT ({x} {y})"),
            Geometry::Polygon(ring) => {
                let mut coords: Vec<String> = ring.iter().map(|(x, y)| format!("{x} {y}")).collect();
                if let Some((x, y)) = ring.first() {
                    coords.push(format!("{x} {y}"));
                }
                format!("POLYGON (({}))", coords.join(", "))
            }
        }
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        !self.disjoint(other)
    }

    pub fn disjoint(&self, other: &Geometry) -> bool {
        match (self, other) {
            (Geometry::Point { x, y }, Geometry::Point { x: x2, y: y2 }) => {
                !(same(*x, *x2) && same(*y, *y2))
            }
            (Geometry::Point { x, y }, Geometry::Polygon(ring))
            | (Geometry::Polygon(ring), Geometry::Point { x, y }) => {
                locate(ring, (*x, *y)) == Location::Outside
            }
            (Geometry::Polygon(a), Geometry::Polygon(b)) => {
                a.iter().all(|p| locate(b, *p) == Location::Outside)
                    && b.iter().all(|p| locate(a, *p) == Location::Outside)
                    && !edges(a).any(|e| edges(b).any(|f| segments_meet(e, f)))
            }
        }
    }

    /// True when `self` lies in `other` and their interiors meet.
    pub fn within(&self, other: &Geometry) -> bool {
        match (self, other) {
            (Geometry::Point { .. }, Geometry::Point { .. }) => !self.disjoint(other),
            (Geometry::Point { x, y }, Geometry::Polygon(ring)) => {
                locate(ring, (*x, *y)) == Location::Inside
            }
            (Geometry::Polygon(_), Geometry::Point { .. }) => false,
            (Geometry::Polygon(a), Geometry::Polygon(b)) => {
                let samples = a.iter().copied().chain(edges(a).map(midpoint));
                let mut inside_any = false;
                for p in samples {
                    match locate(b, p) {
                        Location::Outside => return false,
                        Location::Inside => inside_any = true,
                        Location::Boundary => {}
                    }
                }
                let crossing = edges(a).any(|e| edges(b).any(|f| segments_cross(e, f)));
                !crossing && (inside_any || polygons_equal(a, b))
            }
        }
    }

    pub fn contains(&self, other: &Geometry) -> bool {
        other.within(self)
    }

    /// True when the geometries meet only along their boundaries.
    pub fn touches(&self, other: &Geometry) -> bool {
        match (self, other) {
            (Geometry::Point { .. }, Geometry::Point { .. }) => false,
            (Geometry::Point { x, y }, Geometry::Polygon(ring))
            | (Geometry::Polygon(ring), Geometry::Point { x, y }) => {
                locate(ring, (*x, *y)) == Location::Boundary
            }
            (Geometry::Polygon(a), Geometry::Polygon(b)) => {
                if self.disjoint(other) {
                    return false;
                }
                let mut a_samples = a.iter().copied().chain(edges(a).map(midpoint));
                let mut b_samples = b.iter().copied().chain(edges(b).map(midpoint));
                let interior_overlap = a_samples.any(|p| locate(b, p) == Location::Inside)
                    || b_samples.any(|p| locate(a, p) == Location::Inside)
                    || edges(a).any(|e| edges(b).any(|f| segments_cross(e, f)));
                !interior_overlap
            }
        }
    }

    /// Crossing needs a line geometry on at least one side; points and
    /// polygons never cross.
    pub fn crosses(&self, _other: &Geometry) -> bool {
        false
    }

    /// Coordinate-wise equality to `decimal` places.
    pub fn almost_equals(&self, other: &Geometry, decimal: i32) -> bool {
        let tolerance = 0.5 * 10f64.powi(-decimal);
        let close = |a: f64, b: f64| (a - b).abs() < tolerance;
        match (self, other) {
            (Geometry::Point { x, y }, Geometry::Point { x: x2, y: y2 }) => {
                close(*x, *x2) && close(*y, *y2)
            }
            (Geometry::Polygon(a), Geometry::Polygon(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((x, y), (x2, y2))| close(*x, *x2) && close(*y, *y2))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

fn parse_wkt(text: &str) -> Result<Geometry, String> {
    let open = text
        .find('(')
        .ok_or_else(|| format!("invalid WKT '{text}': missing '('"))?;
    let kind = text[..open].trim().to_ascii_uppercase();
    let body = text[open..].trim();
    if !body.ends_with(')') {
        return Err(format!("invalid WKT '{text}': missing ')'"));
    }
    let inner = &body[1..body.len() - 1];

    match kind.as_str() {
        "POINT" => {
            let coords = parse_wkt_coords(inner)?;
            match coords.as_slice() {
                [(x, y)] => Ok(Geometry::point(*x, *y)),
                _ => Err(format!("invalid WKT point '{text}'")),
            }
        }
        "POLYGON" => {
            let inner = inner.trim();
            if !inner.starts_with('(') || !inner.ends_with(')') {
                return Err(format!("invalid WKT polygon '{text}'"));
            }
            let ring = &inner[1..inner.len() - 1];
            if ring.contains('(') || ring.contains(')') {
                return Err(format!("polygons with holes are not supported: '{text}'"));
            }
            Geometry::polygon(parse_wkt_coords(ring)?)
        }
        other => Err(format!("unsupported WKT geometry type '{other}'")),
    }
}

fn parse_wkt_coords(text: &str) -> Result<Vec<(f64, f64)>, String> {
    text.split(',')
        .map(|pair| {
            let nums: Vec<f64> = pair
                .split_whitespace()
                .map(|n| {
                    n.parse::<f64>()
                        .map_err(|_| format!("invalid WKT coordinate '{n}'"))
                })
                .collect::<Result<_, _>>()?;
            match nums.as_slice() {
                [x, y] => Ok((*x, *y)),
                _ => Err(format!("expected 'x y' in WKT, got '{}'", pair.trim())),
            }
        })
        .collect()
}

type Segment = ((f64, f64), (f64, f64));

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPS
}

fn edges(ring: &[(f64, f64)]) -> impl Iterator<Item = Segment> + '_ {
    (0..ring.len()).map(move |i| (ring[i], ring[(i + 1) % ring.len()]))
}

fn midpoint(((x1, y1), (x2, y2)): Segment) -> (f64, f64) {
    ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

fn on_segment(p: (f64, f64), (a, b): Segment) -> bool {
    cross(a, b, p).abs() <= EPS
        && p.0 >= a.0.min(b.0) - EPS
        && p.0 <= a.0.max(b.0) + EPS
        && p.1 >= a.1.min(b.1) - EPS
        && p.1 <= a.1.max(b.1) + EPS
}

/// Segments share at least one point.
fn segments_meet(e: Segment, f: Segment) -> bool {
    segments_cross(e, f)
        || on_segment(e.0, f)
        || on_segment(e.1, f)
        || on_segment(f.0, e)
        || on_segment(f.1, e)
}

/// Segments cross at a single interior point of both.
fn segments_cross((a, b): Segment, (c, d): Segment) -> bool {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    ((d1 > EPS && d2 < -EPS) || (d1 < -EPS && d2 > EPS))
        && ((d3 > EPS && d4 < -EPS) || (d3 < -EPS && d4 > EPS))
}

fn locate(ring: &[(f64, f64)], p: (f64, f64)) -> Location {
    if edges(ring).any(|e| on_segment(p, e)) {
        return Location::Boundary;
    }
    // even-odd ray casting
    let mut inside = false;
    for ((x1, y1), (x2, y2)) in edges(ring) {
        if (y1 > p.1) != (y2 > p.1) {
            let x_at = x1 + (p.1 - y1) * (x2 - x1) / (y2 - y1);
            if p.0 < x_at {
                inside = !inside;
            }
        }
    }
    if inside {
        Location::Inside
    } else {
        Location::Outside
    }
}

fn polygons_equal(a: &[(f64, f64)], b: &[(f64, f64)]) -> bool {
    a.len() == b.len() && a.iter().all(|p| b.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point_pair() {
        assert_eq!(Geometry::parse(" 10.5, -3 ").unwrap(), Geometry::point(10.5, -3.0));
    }

    #[test]
    fn test_parse_box() {
        let g = Geometry::parse("-10, 34, 20, 60").unwrap();
        assert_eq!(g, Geometry::bbox(-10.0, 34.0, 20.0, 60.0));
        assert!(g.contains(&Geometry::point(0.0, 50.0)));
    }

    #[test]
    fn test_parse_wkt() {
        assert_eq!(
            Geometry::parse("POINT (1 2)").unwrap(),
            Geometry::point(1.0, 2.0)
        );
        let poly = Geometry::parse("polygon ((0 0, 4 0, 4 4, 0 4, 0 0))").unwrap();
        assert_eq!(poly, Geometry::bbox(0.0, 0.0, 4.0, 4.0));
        assert_eq!(Geometry::parse(&poly.to_wkt()).unwrap(), poly);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Geometry::parse("").is_err());
        assert!(Geometry::parse("1, 2, 3").is_err());
        assert!(Geometry::parse("abc").is_err());
        assert!(Geometry::parse("LINESTRING (0 0, 1 1)").is_err());
        assert!(Geometry::parse("POLYGON ((0 0, 1 1))").is_err());
    }

    #[test]
    fn test_point_in_polygon() {
        let square = Geometry::bbox(0.0, 0.0, 2.0, 2.0);
        assert!(Geometry::point(1.0, 1.0).within(&square));
        assert!(!Geometry::point(3.0, 1.0).within(&square));
        assert!(!Geometry::point(0.0, 1.0).within(&square));
        assert!(Geometry::point(0.0, 1.0).touches(&square));
        assert!(Geometry::point(0.0, 1.0).intersects(&square));
        assert!(Geometry::point(3.0, 1.0).disjoint(&square));
    }

    #[test]
    fn test_polygon_relations() {
        let big = Geometry::bbox(0.0, 0.0, 10.0, 10.0);
        let small = Geometry::bbox(2.0, 2.0, 4.0, 4.0);
        let overlapping = Geometry::bbox(8.0, 8.0, 12.0, 12.0);
        let adjacent = Geometry::bbox(10.0, 0.0, 12.0, 10.0);
        let far = Geometry::bbox(20.0, 20.0, 21.0, 21.0);

        assert!(small.within(&big));
        assert!(big.contains(&small));
        assert!(!overlapping.within(&big));
        assert!(overlapping.intersects(&big));
        assert!(!overlapping.touches(&big));
        assert!(adjacent.touches(&big));
        assert!(far.disjoint(&big));
        assert!(big.within(&big));
    }

    #[test]
    fn test_almost_equals() {
        let a = Geometry::point(1.0, 2.0);
        let b = Geometry::point(1.0000001, 2.0);
        assert!(a.almost_equals(&b, 6));
        assert!(!a.almost_equals(&b, 8));
        assert!(!a.almost_equals(&Geometry::bbox(0.0, 0.0, 1.0, 1.0), 6));
    }
}
