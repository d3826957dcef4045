use crate::geom::EPS;
use crate::geom::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A point in the model plane.
///
/// Axisymmetric geometries only accept points with `y >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns true if both points are very close to each other.
    pub fn is_close(&self, other: &Self) -> bool {
        self.is_close_eps(other, EPS)
    }

    /// Same as [`Point::is_close`] with an explicit tolerance.
    pub fn is_close_eps(&self, other: &Self, eps: f64) -> bool {
        (self.x - other.x).abs() < eps && (self.y - other.y).abs() < eps
    }

    pub fn distance(&self, other: &Self) -> f64 {
        (*other - *self).length()
    }

    /// Checks if the point lies on the segment `a`-`b` (endpoints included).
    ///
    /// The point must be within `eps` of the segment line and its projection
    /// must fall between the endpoints.
    pub fn is_on_segment(&self, a: Point, b: Point, eps: f64) -> bool {
        let ab = b - a;
        let ap = *self - a;
        let len = ab.length();
        if len < eps {
            return self.is_close_eps(&a, eps);
        }
        if (ab.cross(ap) / len).abs() > eps {
            return false;
        }
        let t = ab.dot(ap) / (len * len);
        t >= -eps / len && t <= 1.0 + eps / len
    }

    // Creates a new point along the edge pt1->pt2 with some relative distance from pt1.
    pub fn new_between_2_points(pt1: Self, pt2: Self, rel_d: f64) -> Self {
        pt1 + (pt2 - pt1) * rel_d
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(2); // Default 2 decimals
        write!(f, "Point({:.prec$}, {:.prec$})", self.x, self.y, prec = prec)
    }
}

impl Add<Vector> for Point {
    type Output = Point;
    fn add(self, other: Vector) -> Self {
        Self {
            x: self.x + other.dx,
            y: self.y + other.dy,
        }
    }
}

impl Sub for Point {
    type Output = Vector;
    fn sub(self, other: Self) -> Vector {
        Vector::from_points(other, self)
    }
}

/// Signed area of a closed polygon (positive when counter-clockwise).
pub fn signed_area(pts: &[Point]) -> f64 {
    let n = pts.len();
    if n < 3 {
        return 0.0;
    }
    let mut a = 0.0;
    for i in 0..n {
        let p = pts[i];
        let q = pts[(i + 1) % n];
        a += p.x * q.y - q.x * p.y;
    }
    0.5 * a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_close() {
        let pa = Point::new(5., 5.);
        let pb = Point::new(5.00000000001, 5.);
        let pc = Point::new(5.0001, 5.);
        assert!(pa.is_close(&pb));
        assert!(!pa.is_close(&pc));
    }

    #[test]
    fn test_is_on_segment() {
        let a = Point::new(0., 0.);
        let b = Point::new(2., 0.);
        assert!(Point::new(1., 0.).is_on_segment(a, b, EPS));
        assert!(Point::new(0., 0.).is_on_segment(a, b, EPS));
        assert!(!Point::new(1., 0.1).is_on_segment(a, b, EPS));
        assert!(!Point::new(3., 0.).is_on_segment(a, b, EPS));
    }

    #[test]
    fn test_new_between_2_points() {
        let p0 = Point::new(0., 0.);
        let p1 = Point::new(1., 1.);
        let ptest = Point::new_between_2_points(p0, p1, 0.5);
        assert!(ptest.is_close(&Point::new(0.5, 0.5)));
        let ptest = Point::new_between_2_points(p0, p0, 1.0);
        assert!(ptest.is_close(&p0));
    }

    #[test]
    fn test_signed_area() {
        let ccw = vec![
            Point::new(0., 0.),
            Point::new(1., 0.),
            Point::new(1., 1.),
            Point::new(0., 1.),
        ];
        assert!((signed_area(&ccw) - 1.0).abs() < EPS);
        let cw: Vec<Point> = ccw.iter().rev().cloned().collect();
        assert!((signed_area(&cw) + 1.0).abs() < EPS);
    }
}
