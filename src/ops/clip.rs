// ============================================================================
// POLYGON CLIPPING — Sutherland–Hodgman against a convex clip polygon
// ============================================================================

use super::geometry::{Point, cross, line_intersection, polygon_area};

/// Clip `subject` against every edge of the convex polygon `clip`.
///
/// A subject vertex is kept when it lies on the inside half-plane of the
/// current clip edge (cross ≥ 0 with the clip wound counter-clockwise in
/// y-up terms; a clip wound the other way is reversed first). Crossings
/// insert the intersection of the subject edge with the clip edge's line.
///
/// Parallel lines have no intersection point; such a crossing contributes
/// no vertex instead of a placeholder point.
pub fn clip_polygon(subject: &[Point], clip: &[Point]) -> Vec<Point> {
    if subject.is_empty() || clip.len() < 3 {
        return Vec::new();
    }

    let mut clip = clip.to_vec();
    if polygon_area(&clip) < 0.0 {
        clip.reverse();
    }

    let mut output = subject.to_vec();
    let clip_n = clip.len();

    for i in 0..clip_n {
        if output.is_empty() {
            break;
        }
        let edge_start = clip[i];
        let edge_end = clip[(i + 1) % clip_n];

        let input = std::mem::take(&mut output);
        let input_n = input.len();
        for j in 0..input_n {
            let current = input[j];
            let next = input[(j + 1) % input_n];

            let current_inside = is_inside(current, edge_start, edge_end);
            let next_inside = is_inside(next, edge_start, edge_end);

            if current_inside {
                output.push(current);
                if !next_inside
                    && let Some(x) = line_intersection(current, next, edge_start, edge_end)
                {
                    output.push(x);
                }
            } else if next_inside
                && let Some(x) = line_intersection(current, next, edge_start, edge_end)
            {
                output.push(x);
            }
        }
    }

    output
}

#[inline]
fn is_inside(p: Point, edge_start: Point, edge_end: Point) -> bool {
    cross(edge_start, edge_end, p) >= 0.0
}
