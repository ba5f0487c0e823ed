//! Image-space geometry for annotations.
//!
//! Every coordinate in this module is expressed in full-resolution image pixels.
//! Screen-space projections live in [`crate::overlay`] and are never stored.

use serde::{Deserialize, Serialize};

use crate::constants::{GEOMETRY_EPSILON, MIN_RING_VERTICES};
use crate::error::GeometryError;

/// A point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// An axis-aligned rectangle (top-left corner plus size).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Normalized rectangle spanning two corner points.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Smallest rectangle containing all points, or `None` for an empty set.
    pub fn enclosing(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in iter {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Corners in drawing order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.right(), self.bottom()),
            Point::new(self.x, self.bottom()),
        ]
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Closed-interval overlap test, so touching edges count as intersecting.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

impl From<[f64; 4]> for Rect {
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<Rect> for [f64; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

/// Annotation geometry. Polygons hold their outer ring first, holes after.
///
/// Serialized GeoJSON-style as `{"type": ..., "coordinates": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Point),
    Polygon(Vec<Vec<Point>>),
    Rectangle(Rect),
}

impl Geometry {
    /// Polygon with a single outer ring.
    pub fn polygon(outer: Vec<Point>) -> Self {
        Geometry::Polygon(vec![outer])
    }

    /// Polygon from `[x, y]` pairs, convenient for literals.
    pub fn polygon_from_coords(coords: &[[f64; 2]]) -> Self {
        Self::polygon(coords.iter().copied().map(Point::from).collect())
    }

    /// Type name as used on the wire and in exports.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::Polygon(_) => "Polygon",
            Geometry::Rectangle(_) => "Rectangle",
        }
    }

    /// Check the geometry can be projected and measured.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Point(p) => check_finite(p),
            Geometry::Rectangle(r) => {
                if !r.is_finite() || r.width < 0.0 || r.height < 0.0 {
                    return Err(GeometryError::InvalidRectangle {
                        width: r.width,
                        height: r.height,
                    });
                }
                Ok(())
            }
            Geometry::Polygon(rings) => {
                if rings.is_empty() {
                    return Err(GeometryError::NoRings);
                }
                for (index, ring) in rings.iter().enumerate() {
                    ring.iter().try_for_each(check_finite)?;
                    let count = distinct_vertices(ring);
                    if count < MIN_RING_VERTICES {
                        return Err(GeometryError::TooFewVertices {
                            ring: index,
                            count,
                            min: MIN_RING_VERTICES,
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Image-space bounding box.
    pub fn bounds(&self) -> Option<Rect> {
        match self {
            Geometry::Point(p) => Some(Rect::new(p.x, p.y, 0.0, 0.0)),
            Geometry::Rectangle(r) => Some(*r),
            Geometry::Polygon(rings) => Rect::enclosing(rings.first()?.iter().copied()),
        }
    }

    /// Rings as closed coordinate loops (first vertex repeated at the end).
    ///
    /// Rectangles become a single ring; points have none.
    pub fn closed_rings(&self) -> Vec<Vec<Point>> {
        match self {
            Geometry::Point(_) => Vec::new(),
            Geometry::Rectangle(r) => {
                let mut ring = r.corners().to_vec();
                ring.push(ring[0]);
                vec![ring]
            }
            Geometry::Polygon(rings) => rings
                .iter()
                .map(|ring| {
                    let mut closed = ring.clone();
                    if let (Some(first), Some(last)) = (ring.first(), ring.last())
                        && first != last
                    {
                        closed.push(*first);
                    }
                    closed
                })
                .collect(),
        }
    }

    /// Area in square image pixels (holes subtracted).
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Point(_) => 0.0,
            Geometry::Rectangle(r) => r.area(),
            Geometry::Polygon(rings) => {
                let mut iter = rings.iter();
                let Some(outer) = iter.next() else {
                    return 0.0;
                };
                let holes: f64 = iter.map(|ring| ring_area_centroid(ring).0.abs()).sum();
                (ring_area_centroid(outer).0.abs() - holes).max(0.0)
            }
        }
    }

    /// Perimeter in image pixels (outer ring plus hole boundaries).
    pub fn perimeter(&self) -> f64 {
        match self {
            Geometry::Point(_) => 0.0,
            Geometry::Rectangle(r) => 2.0 * (r.width + r.height),
            Geometry::Polygon(rings) => rings.iter().map(|ring| ring_length(ring)).sum(),
        }
    }

    /// Area-weighted centroid; falls back to the vertex mean for degenerate rings.
    pub fn centroid(&self) -> Option<Point> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::Rectangle(r) => Some(r.center()),
            Geometry::Polygon(rings) => {
                let outer = rings.first()?;
                let (outer_area, outer_c) = ring_area_centroid(outer);
                let mut area = outer_area.abs();
                let mut cx = outer_c.x * area;
                let mut cy = outer_c.y * area;
                for hole in &rings[1..] {
                    let (hole_area, hole_c) = ring_area_centroid(hole);
                    let hole_area = hole_area.abs();
                    area -= hole_area;
                    cx -= hole_c.x * hole_area;
                    cy -= hole_c.y * hole_area;
                }
                if area > GEOMETRY_EPSILON {
                    Some(Point::new(cx / area, cy / area))
                } else {
                    vertex_mean(outer)
                }
            }
        }
    }
}

fn check_finite(p: &Point) -> Result<(), GeometryError> {
    if p.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::NonFinite { x: p.x, y: p.y })
    }
}

/// Count vertices, ignoring a trailing copy of the first vertex.
fn distinct_vertices(ring: &[Point]) -> usize {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => ring.len() - 1,
        _ => ring.len(),
    }
}

/// Signed shoelace area and centroid of a ring (implicitly closed).
fn ring_area_centroid(ring: &[Point]) -> (f64, Point) {
    let n = ring.len();
    if n < 3 {
        return (0.0, vertex_mean(ring).unwrap_or_default());
    }
    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let cross = a.x * b.y - b.x * a.y;
        twice_area += cross;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    let area = twice_area / 2.0;
    if area.abs() <= GEOMETRY_EPSILON {
        return (0.0, vertex_mean(ring).unwrap_or_default());
    }
    (area, Point::new(cx / (6.0 * area), cy / (6.0 * area)))
}

fn ring_length(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| ring[i].distance_to(&ring[(i + 1) % n])).sum()
}

fn vertex_mean(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}
