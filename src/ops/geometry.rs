// ============================================================================
// GEOMETRY KERNEL — points, bounds, containment and intersection tests
// ============================================================================
//
// Every function here is total: degenerate input (empty lists, zero-length
// edges, collinear points) produces a best-effort degenerate answer instead
// of panicking. These run on the live drawing path while the user is still
// placing points.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Tolerance for treating a cross product / determinant as zero.
pub const GEOM_EPSILON: f64 = 1e-9;

/// A 2D coordinate in image pixel space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z-component of the 3D cross product of two vectors.
    pub fn cross(self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length_sq(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_sq().sqrt()
    }

    pub fn dist_sq(self, other: Point) -> f64 {
        (other - self).length_sq()
    }

    /// Unit vector in the same direction, or `None` for a zero-length vector.
    pub fn normalized(self) -> Option<Point> {
        let len = self.length();
        if len < GEOM_EPSILON || !len.is_finite() {
            None
        } else {
            Some(Point::new(self.x / len, self.y / len))
        }
    }

    /// The vector rotated 90° (counter-clockwise in y-up coordinates).
    pub fn perpendicular(self) -> Point {
        Point::new(-self.y, self.x)
    }

    pub fn translate(self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

/// Cross product of `a - o` and `b - o`.
/// Positive when o → a → b turns left in y-up coordinates.
#[inline]
pub fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a - o).cross(b - o)
}

// ---------------------------------------------------------------------------
//  Bounds
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn origin(&self) -> Point {
        Point::new(self.min_x, self.min_y)
    }

    /// True when either side has zero (or negative) extent.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Closed-interval overlap test (touching boxes intersect).
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Corners in top-left, top-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
            Point::new(self.min_x, self.max_y),
        ]
    }
}

/// Bounding box of a point list, `None` when the list is empty.
pub fn bounding_box(points: &[Point]) -> Option<Bounds> {
    let first = points.first()?;
    let mut b = Bounds {
        min_x: first.x,
        min_y: first.y,
        max_x: first.x,
        max_y: first.y,
    };
    for p in &points[1..] {
        b.min_x = b.min_x.min(p.x);
        b.min_y = b.min_y.min(p.y);
        b.max_x = b.max_x.max(p.x);
        b.max_y = b.max_y.max(p.y);
    }
    Some(b)
}

/// Top-left placement of a polygon in base-image coordinates.
/// Returns the origin for an empty polygon.
pub fn find_min_offset(points: &[Point]) -> Point {
    bounding_box(points).map_or(Point::ORIGIN, |b| b.origin())
}

/// A polygon can be filled when it has at least three points and its
/// bounding box has non-zero width and height.
pub fn can_make_closed_shape(points: &[Point]) -> bool {
    points.len() >= 3
        && points.iter().all(|p| p.is_finite())
        && bounding_box(points).is_some_and(|b| !b.is_empty())
}

pub fn translate_polygon(points: &[Point], dx: f64, dy: f64) -> Vec<Point> {
    points.iter().map(|p| p.translate(dx, dy)).collect()
}

/// Signed shoelace area. Positive for counter-clockwise winding in y-up
/// coordinates (clockwise on screen).
pub fn polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].cross(points[j]);
    }
    sum * 0.5
}

/// Vertex average. Origin for an empty list.
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::ORIGIN;
    }
    let sum = points.iter().fold(Point::ORIGIN, |acc, p| acc + *p);
    sum * (1.0 / points.len() as f64)
}

// ---------------------------------------------------------------------------
//  Containment
// ---------------------------------------------------------------------------

/// X coordinate where edge `a`–`b` crosses the horizontal line at `y`, using
/// the half-open rule `(a.y > y) != (b.y > y)`.
///
/// The endpoints are ordered by y before interpolating so the result does not
/// depend on edge direction; the mask rasterizer and the point test share this
/// so that "pixel inside" and "point inside" always agree.
#[inline]
pub(crate) fn scanline_crossing(a: Point, b: Point, y: f64) -> Option<f64> {
    if (a.y > y) == (b.y > y) {
        return None;
    }
    let (lo, hi) = if a.y <= b.y { (a, b) } else { (b, a) };
    Some(lo.x + (y - lo.y) * (hi.x - lo.x) / (hi.y - lo.y))
}

/// Even-odd ray casting against a single ring.
pub fn point_in_ring(p: Point, ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if let Some(x) = scanline_crossing(a, b, p.y)
            && p.x < x
        {
            inside = !inside;
        }
    }
    inside
}

fn in_any_hole(p: Point, holes: &[Vec<Point>]) -> bool {
    holes.iter().any(|h| point_in_ring(p, h))
}

/// Point-in-polygon with holes subtracted: a point inside any hole counts as
/// outside.
pub fn point_in_polygon(p: Point, polygon: &[Point], holes: &[Vec<Point>]) -> bool {
    point_in_ring(p, polygon) && !in_any_hole(p, holes)
}

// ---------------------------------------------------------------------------
//  Segments and lines
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Collinear,
    Clockwise,
    CounterClockwise,
}

/// Orientation of the ordered triple (p, q, r) in y-up terms.
pub fn orientation(p: Point, q: Point, r: Point) -> Orientation {
    let v = cross(p, q, r);
    if v.abs() <= GEOM_EPSILON {
        Orientation::Collinear
    } else if v > 0.0 {
        Orientation::CounterClockwise
    } else {
        Orientation::Clockwise
    }
}

/// Given collinear p, q, r: does q lie on segment p–r?
fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.x <= p.x.max(r.x) + GEOM_EPSILON
        && q.x >= p.x.min(r.x) - GEOM_EPSILON
        && q.y <= p.y.max(r.y) + GEOM_EPSILON
        && q.y >= p.y.min(r.y) - GEOM_EPSILON
}

/// Closed segment intersection test for p1–q1 and p2–q2, including touching
/// endpoints and collinear overlap.
pub fn segments_intersect(p1: Point, q1: Point, p2: Point, q2: Point) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == Orientation::Collinear && on_segment(p1, p2, q1))
        || (o2 == Orientation::Collinear && on_segment(p1, q2, q1))
        || (o3 == Orientation::Collinear && on_segment(p2, p1, q2))
        || (o4 == Orientation::Collinear && on_segment(p2, q1, q2))
}

/// Intersection of the infinite lines through a1–a2 and b1–b2.
/// `None` when the lines are parallel (zero determinant).
pub fn line_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    let da = a2 - a1;
    let db = b2 - b1;
    let denom = da.cross(db);
    if denom.abs() <= GEOM_EPSILON {
        return None;
    }
    let t = (b1 - a1).cross(db) / denom;
    let p = a1 + da * t;
    p.is_finite().then_some(p)
}

/// Do polygons `a` and `b` overlap?
///
/// Vertices of `a` that fall inside one of `holes` are not counted as
/// covering `b`.
pub fn polygons_intersect(a: &[Point], b: &[Point], holes: &[Vec<Point>]) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }

    if a.iter().any(|&p| !in_any_hole(p, holes) && point_in_ring(p, b)) {
        return true;
    }

    let (Some(ba), Some(bb)) = (bounding_box(a), bounding_box(b)) else {
        return false;
    };
    if !ba.intersects(&bb) {
        return false;
    }

    if b.iter().any(|&p| point_in_polygon(p, a, holes)) {
        return true;
    }

    let na = a.len();
    let nb = b.len();
    for i in 0..na {
        let (p1, q1) = (a[i], a[(i + 1) % na]);
        for j in 0..nb {
            let (p2, q2) = (b[j], b[(j + 1) % nb]);
            if segments_intersect(p1, q1, p2, q2) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x0 + size, y0),
            Point::new(x0 + size, y0 + size),
            Point::new(x0, y0 + size),
        ]
    }

    #[test]
    fn point_in_square_and_hole() {
        let sq = square(0.0, 0.0, 10.0);
        assert!(point_in_polygon(Point::new(5.0, 5.0), &sq, &[]));
        assert!(!point_in_polygon(Point::new(15.0, 5.0), &sq, &[]));

        let cover = vec![square(-1.0, -1.0, 12.0)];
        for y in 1..10 {
            for x in 1..10 {
                let p = Point::new(x as f64, y as f64);
                assert!(!point_in_polygon(p, &sq, &cover), "{:?} should be outside", p);
            }
        }
    }

    #[test]
    fn degenerate_rings_contain_nothing() {
        let seg = vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)];
        assert!(!point_in_polygon(Point::new(2.0, 2.0), &seg, &[]));
        assert!(!point_in_polygon(Point::new(0.0, 0.0), &[], &[]));
    }

    #[test]
    fn closed_shape_requires_area_bounds() {
        assert!(can_make_closed_shape(&square(0.0, 0.0, 3.0)));
        assert!(!can_make_closed_shape(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]));
        // three points on a horizontal line: zero-height bounds
        let flat = [Point::new(0.0, 2.0), Point::new(3.0, 2.0), Point::new(6.0, 2.0)];
        assert!(!can_make_closed_shape(&flat));
    }

    #[test]
    fn min_offset_and_area() {
        let sq = square(50.0, 40.0, 100.0);
        assert_eq!(find_min_offset(&sq), Point::new(50.0, 40.0));
        assert_eq!(find_min_offset(&[]), Point::ORIGIN);
        assert!((polygon_area(&sq).abs() - 10_000.0).abs() < 1e-9);
        assert_eq!(centroid(&sq), Point::new(100.0, 90.0));
    }

    #[test]
    fn segment_cases() {
        let o = Point::ORIGIN;
        // crossing
        assert!(segments_intersect(o, Point::new(4.0, 4.0), Point::new(0.0, 4.0), Point::new(4.0, 0.0)));
        // disjoint parallel
        assert!(!segments_intersect(o, Point::new(4.0, 0.0), Point::new(0.0, 1.0), Point::new(4.0, 1.0)));
        // collinear overlap
        assert!(segments_intersect(o, Point::new(4.0, 0.0), Point::new(2.0, 0.0), Point::new(6.0, 0.0)));
        // collinear, separate
        assert!(!segments_intersect(o, Point::new(1.0, 0.0), Point::new(2.0, 0.0), Point::new(3.0, 0.0)));
        // touching endpoint
        assert!(segments_intersect(o, Point::new(2.0, 2.0), Point::new(2.0, 2.0), Point::new(4.0, 0.0)));
    }

    #[test]
    fn line_intersection_and_parallel() {
        let p = line_intersection(
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 2.0),
            Point::new(2.0, 0.0),
        )
        .unwrap();
        assert!((p.x - 1.0).abs() < 1e-12 && (p.y - 1.0).abs() < 1e-12);

        assert!(line_intersection(
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
        )
        .is_none());
    }

    #[test]
    fn polygon_overlap_cases() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 5.0, 10.0);
        let far = square(100.0, 100.0, 5.0);
        // cross shape: no vertex containment, only edge crossings
        let wide = vec![
            Point::new(-5.0, 4.0),
            Point::new(15.0, 4.0),
            Point::new(15.0, 6.0),
            Point::new(-5.0, 6.0),
        ];
        assert!(polygons_intersect(&a, &b, &[]));
        assert!(!polygons_intersect(&a, &far, &[]));
        assert!(polygons_intersect(&a, &wide, &[]));
        // b fully inside a
        assert!(polygons_intersect(&a, &square(2.0, 2.0, 2.0), &[]));
        assert!(!polygons_intersect(&a, &[], &[]));
    }

    #[test]
    fn hole_excludes_vertex_shortcut() {
        // a sits inside b with every vertex of a covered by a hole. b is
        // larger, so no edges cross and none of b's vertices are inside a.
        let a = square(4.0, 4.0, 2.0);
        let b = square(0.0, 0.0, 10.0);
        let hole = vec![square(3.0, 3.0, 4.0)];
        assert!(polygons_intersect(&a, &b, &[]));
        assert!(!polygons_intersect(&a, &b, &hole));
    }
}
