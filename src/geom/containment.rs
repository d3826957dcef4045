use thiserror::Error;

use crate::geom::bboxes::{bounding_box, is_point_inside_bbox};
use crate::geom::point::Point;
use crate::geom::vector::Vector;

/// Initial ray direction (radians). Deliberately not aligned with the axes,
/// because user geometry mostly is.
const BASE_RAY_ANGLE: f64 = 0.318_309_886;
/// Angle increment between retries (golden angle).
const RAY_ANGLE_STEP: f64 = 2.399_963_229;
/// Minimum |sin| between the ray and a segment before the hit is treated
/// as near-tangent.
const MIN_CROSSING_SINE: f64 = 1e-9;

/// The parity test could not decide, even after perturbing the ray.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("parity test ambiguous for point ({x}, {y}) after {attempts} rays")]
pub struct ParityAmbiguous {
    pub x: f64,
    pub y: f64,
    pub attempts: usize,
}

/// Outcome of casting a single ray.
enum RayCast {
    Crossings(usize),
    Ambiguous,
}

/// Checks if a point lies strictly inside a closed polygon using a
/// ray-crossing (parity) test.
///
/// The polygon is given by its vertices `pts` (implicitly closed). If the ray
/// passes through a vertex, runs along an edge, or the point lies on the
/// boundary, the ray angle is perturbed and the test repeated, at most
/// `retries` additional times.
pub fn is_point_inside_polygon(
    ptest: Point,
    pts: &[Point],
    eps: f64,
    retries: usize,
) -> Result<bool, ParityAmbiguous> {
    if pts.len() < 3 {
        return Ok(false);
    }
    // Quick rejection: a point clearly outside the bounding box can't be inside
    if let Some((pmin, pmax)) = bounding_box(pts)
        && !is_point_inside_bbox(ptest, pmin, pmax, eps)
    {
        return Ok(false);
    }

    for attempt in 0..=retries {
        let dir = Vector::from_angle(BASE_RAY_ANGLE + attempt as f64 * RAY_ANGLE_STEP);
        match cast_ray(ptest, dir, pts, eps) {
            RayCast::Crossings(n) => return Ok(n % 2 == 1),
            RayCast::Ambiguous => continue,
        }
    }

    Err(ParityAmbiguous {
        x: ptest.x,
        y: ptest.y,
        attempts: retries + 1,
    })
}

fn cast_ray(origin: Point, dir: Vector, pts: &[Point], eps: f64) -> RayCast {
    let n = pts.len();
    let mut crossings = 0;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        let seg = b - a;
        let seg_len = seg.length();
        if seg_len < eps {
            continue;
        }
        let ap = a - origin;

        // Point on the boundary can never be resolved by rotating the ray
        if origin.is_on_segment(a, b, eps) {
            return RayCast::Ambiguous;
        }

        let denom = dir.cross(seg);
        if (denom / seg_len).abs() < MIN_CROSSING_SINE {
            // Parallel: ambiguous only when the ray runs along the segment
            if (ap.cross(dir)).abs() < eps && (ap.dot(dir) > 0.0 || (b - origin).dot(dir) > 0.0) {
                return RayCast::Ambiguous;
            }
            continue;
        }

        let t = ap.cross(seg) / denom;
        let s = ap.cross(dir) / denom;
        if t <= 0.0 {
            continue;
        }
        let s_tol = eps / seg_len;
        if s < -s_tol || s > 1.0 + s_tol {
            continue;
        }
        if s.abs() <= s_tol || (1.0 - s).abs() <= s_tol {
            // Ray passes through a vertex
            return RayCast::Ambiguous;
        }
        crossings += 1;
    }
    RayCast::Crossings(crossings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::EPS;

    fn make_square() -> Vec<Point> {
        vec![
            Point::new(0., 0.),
            Point::new(1., 0.),
            Point::new(1., 1.),
            Point::new(0., 1.),
        ]
    }

    #[test]
    fn test_point_inside_square() {
        let pts = make_square();
        assert_eq!(is_point_inside_polygon(Point::new(0.5, 0.5), &pts, EPS, 4), Ok(true));
    }

    #[test]
    fn test_point_outside_square() {
        let pts = make_square();
        assert_eq!(is_point_inside_polygon(Point::new(1.5, 0.5), &pts, EPS, 4), Ok(false));
        assert_eq!(is_point_inside_polygon(Point::new(-0.5, 0.5), &pts, EPS, 4), Ok(false));
    }

    #[test]
    fn test_orientation_does_not_matter() {
        let pts: Vec<Point> = make_square().into_iter().rev().collect();
        assert_eq!(is_point_inside_polygon(Point::new(0.25, 0.75), &pts, EPS, 4), Ok(true));
    }

    #[test]
    fn test_point_on_edge_is_ambiguous() {
        let pts = make_square();
        let res = is_point_inside_polygon(Point::new(0.5, 0.0), &pts, EPS, 3);
        assert_eq!(
            res,
            Err(ParityAmbiguous {
                x: 0.5,
                y: 0.0,
                attempts: 4
            })
        );
    }

    #[test]
    fn test_ray_through_vertex_is_retried() {
        // The first ray from the origin-aligned point hits vertex (2, ~0.7) exactly
        let origin = Point::new(0., 0.);
        let hit = origin + Vector::from_angle(BASE_RAY_ANGLE) * 2.0;
        let pts = vec![
            Point::new(-1., -1.),
            Point::new(hit.x, -1.),
            hit,
            Point::new(hit.x, 3.),
            Point::new(-1., 3.),
        ];
        assert_eq!(is_point_inside_polygon(origin, &pts, EPS, 4), Ok(true));
    }

    #[test]
    fn test_l_shaped_polygon() {
        let pts = vec![
            Point::new(0., 0.),
            Point::new(1., 0.),
            Point::new(1., 1.),
            Point::new(2., 1.),
            Point::new(2., 2.),
            Point::new(0., 2.),
        ];
        assert_eq!(is_point_inside_polygon(Point::new(0.5, 0.5), &pts, EPS, 4), Ok(true));
        assert_eq!(is_point_inside_polygon(Point::new(1.5, 1.5), &pts, EPS, 4), Ok(true));
        // In the cutout
        assert_eq!(is_point_inside_polygon(Point::new(1.5, 0.5), &pts, EPS, 4), Ok(false));
    }

    #[test]
    fn test_degenerate_polygon() {
        let pts = vec![Point::new(0., 0.), Point::new(1., 0.)];
        assert_eq!(is_point_inside_polygon(Point::new(0.5, 0.), &pts, EPS, 4), Ok(false));
    }
}
