//! Line segment operations in the model plane.
//!
//! Used by the loop resolver to detect edges that cross each other and nodes
//! that lie on an edge without being one of its endpoints.

use crate::geom::point::Point;

/// Result of a line segment intersection test.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentIntersection {
    /// Segments intersect at a single point
    Point(Point),
    /// Segments are parallel and do not intersect
    Parallel,
    /// Segments are collinear and overlap (returns the overlap segment)
    Collinear(Point, Point),
    /// No intersection (segments don't reach each other)
    None,
}

/// Finds the intersection of segments `p1`-`p2` and `p3`-`p4`.
pub fn segment_intersection(
    p1: Point,
    p2: Point,
    p3: Point,
    p4: Point,
    eps: f64,
) -> SegmentIntersection {
    let d1 = p2 - p1;
    let d2 = p4 - p3;
    let r = p3 - p1;

    let d1_len = d1.length();
    let d2_len = d2.length();

    // Degenerate segments (points)
    if d1_len < eps || d2_len < eps {
        let (pt, a, b) = if d1_len < eps { (p1, p3, p4) } else { (p3, p1, p2) };
        if pt.is_on_segment(a, b, eps) {
            return SegmentIntersection::Point(pt);
        }
        return SegmentIntersection::None;
    }

    let denom = d1.cross(d2);
    if denom.abs() < eps * d1_len * d2_len {
        // Parallel - check if collinear
        if (r.cross(d1) / d1_len).abs() > eps {
            return SegmentIntersection::Parallel;
        }
        let d1_len_sq = d1.dot(d1);
        let t3 = r.dot(d1) / d1_len_sq;
        let t4 = (p4 - p1).dot(d1) / d1_len_sq;
        let (lo, hi) = if t3 < t4 { (t3, t4) } else { (t4, t3) };
        let start = lo.max(0.0);
        let end = hi.min(1.0);
        let tol = eps / d1_len;
        if start > end + tol {
            return SegmentIntersection::Parallel;
        }
        if (end - start).abs() <= tol {
            return SegmentIntersection::Point(p1 + d1 * start);
        }
        return SegmentIntersection::Collinear(p1 + d1 * start, p1 + d1 * end);
    }

    let t = r.cross(d2) / denom;
    let s = r.cross(d1) / denom;
    let t_tol = eps / d1_len;
    let s_tol = eps / d2_len;
    if (-t_tol..=1.0 + t_tol).contains(&t) && (-s_tol..=1.0 + s_tol).contains(&s) {
        return SegmentIntersection::Point(p1 + d1 * t);
    }

    SegmentIntersection::None
}

/// Checks whether two segments cross or overlap anywhere other than at
/// the endpoints they share.
///
/// Segments meeting only at a common endpoint are not considered crossing.
pub fn are_segments_crossing(p1: Point, p2: Point, p3: Point, p4: Point, eps: f64) -> bool {
    let shared = |a: Point| a.is_close_eps(&p3, eps) || a.is_close_eps(&p4, eps);
    match segment_intersection(p1, p2, p3, p4, eps) {
        SegmentIntersection::Point(pt) => {
            let at_shared_end = (pt.is_close_eps(&p1, eps) && shared(p1))
                || (pt.is_close_eps(&p2, eps) && shared(p2));
            !at_shared_end
        }
        SegmentIntersection::Collinear(a, b) => !a.is_close_eps(&b, eps),
        SegmentIntersection::Parallel | SegmentIntersection::None => false,
    }
}
