// ============================================================================
// HULLS — convex hull construction and hull simplification to N sides
// ============================================================================

use super::geometry::{Point, centroid, cross, line_intersection, polygon_area};

/// Width of the thin quad produced from a two-point "polygon".
pub const SEGMENT_EXPAND_LENGTH: f64 = 10.0;

/// How far the fourth vertex of an expanded triangle is pushed out, relative
/// to the apex's perpendicular distance from the longest edge.
const TRIANGLE_EXPAND_SCALE: f64 = 1.5;

/// Graham scan.
///
/// The anchor is the point with minimum y (ties: minimum x). Remaining points
/// are ordered by polar angle around the anchor, ties by ascending distance.
/// A candidate pops the stack while the last two stack points and the
/// candidate do not make a strict left turn (cross ≤ 0).
///
/// The result has positive signed area (counter-clockwise in y-up terms).
/// Inputs with fewer than three points are returned unchanged.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let anchor_idx = points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let anchor = points[anchor_idx];

    let mut rest: Vec<Point> = points
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != anchor_idx)
        .map(|(_, p)| *p)
        .collect();

    rest.sort_by(|a, b| {
        let ta = (a.y - anchor.y).atan2(a.x - anchor.x);
        let tb = (b.y - anchor.y).atan2(b.x - anchor.x);
        ta.total_cmp(&tb)
            .then_with(|| anchor.dist_sq(*a).total_cmp(&anchor.dist_sq(*b)))
    });

    let mut stack: Vec<Point> = Vec::with_capacity(points.len());
    stack.push(anchor);
    for p in rest {
        while stack.len() >= 2 && cross(stack[stack.len() - 2], stack[stack.len() - 1], p) <= 0.0 {
            stack.pop();
        }
        stack.push(p);
    }

    // Points on the last ray can arrive far-before-near when their angles
    // round differently; drop anything collinear with the closing edge.
    while stack.len() >= 3 && cross(stack[stack.len() - 2], stack[stack.len() - 1], anchor) <= 0.0 {
        stack.pop();
    }
    stack
}

/// Collapse a convex hull to `n` vertices by greedy edge merging.
///
/// For every edge the lines through its two neighbouring edges are
/// intersected; the edge whose replacement triangle (edge endpoints plus the
/// intersection) has the smallest area is merged into that intersection.
/// Stops early, leaving more than `n` vertices, when no edge has a usable
/// intersection.
///
/// Special cases: 0–1 points pass through; 2 points become a thin quad; a
/// triangle asked for four or more sides becomes a quad by reflecting its
/// apex across the midpoint of the longest edge.
pub fn simplify_hull_to_n(hull: &[Point], n: usize) -> Vec<Point> {
    match hull.len() {
        0 | 1 => return hull.to_vec(),
        2 => return expand_segment(hull[0], hull[1]),
        3 if n >= 4 => return expand_triangle([hull[0], hull[1], hull[2]]),
        _ => {}
    }

    // Merging needs the two neighbouring edges to be distinct, so a
    // triangle is the smallest reachable shape.
    let target = n.max(3);
    let mut pts = hull.to_vec();
    let winding = polygon_area(&pts).signum();

    while pts.len() > target {
        let m = pts.len();
        let mut best: Option<(usize, Point, f64)> = None;

        for i in 0..m {
            let prev = pts[(i + m - 1) % m];
            let a = pts[i];
            let b = pts[(i + 1) % m];
            let next = pts[(i + 2) % m];

            let Some(x) = line_intersection(prev, a, b, next) else { continue };

            // The merged vertex must land outside the edge, otherwise the
            // neighbours diverge and the "merge" would fold the hull.
            if winding != 0.0 && cross(a, b, x) * winding > 0.0 {
                continue;
            }

            let area = (cross(a, b, x) * 0.5).abs();
            if best.is_none_or(|(_, _, best_area)| area < best_area) {
                best = Some((i, x, area));
            }
        }

        let Some((i, x, _)) = best else {
            log::debug!(
                "hull simplification stopped at {} vertices (target {}): no mergeable edge",
                m,
                target
            );
            break;
        };
        pts[i] = x;
        pts.remove((i + 1) % m);
    }

    pts
}

/// Thin quad around segment a–b, offset by a fixed-length perpendicular.
/// A zero-length segment uses the x axis as its direction.
fn expand_segment(a: Point, b: Point) -> Vec<Point> {
    let dir = (b - a).normalized().unwrap_or(Point::new(1.0, 0.0));
    let half = dir.perpendicular() * (SEGMENT_EXPAND_LENGTH * 0.5);
    vec![a + half, b + half, b - half, a - half]
}

/// Quad from a triangle: the apex is reflected across the midpoint of the
/// longest edge, its perpendicular extent scaled by 1.5. The four points are
/// then ordered by descending angle around their centroid so the result is
/// never self-intersecting.
fn expand_triangle(tri: [Point; 3]) -> Vec<Point> {
    let longest = (0..3)
        .max_by(|&i, &j| {
            let li = tri[i].dist_sq(tri[(i + 1) % 3]);
            let lj = tri[j].dist_sq(tri[(j + 1) % 3]);
            li.total_cmp(&lj)
        })
        .unwrap_or(0);

    let p = tri[longest];
    let q = tri[(longest + 1) % 3];
    let apex = tri[(longest + 2) % 3];

    let mid = p.midpoint(q);
    let to_mid = mid - apex;
    let reflected = match (q - p).normalized() {
        Some(axis) => {
            let along = axis * to_mid.dot(axis);
            let across = to_mid - along;
            mid + along + across * TRIANGLE_EXPAND_SCALE
        }
        // all three points coincide
        None => mid + to_mid,
    };

    let mut quad = vec![p, apex, q, reflected];
    sort_by_descending_angle(&mut quad);
    quad
}

/// Order points by descending angle around their centroid.
pub fn sort_by_descending_angle(points: &mut [Point]) {
    let c = centroid(points);
    points.sort_by(|a, b| {
        let ta = (a.y - c.y).atan2(a.x - c.x);
        let tb = (b.y - c.y).atan2(b.x - c.x);
        tb.total_cmp(&ta)
    });
}
