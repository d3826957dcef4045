//! Edge shapes: straight segments and circular arcs.
//!
//! A curved edge is an arc that turns counter-clockwise about its centre by
//! the edge angle while running from the start node to the end node. The loop
//! resolver orders edges around a node by their tangent direction, and uses
//! a polyline of the arc for areas and parity tests.

use std::f64::consts::{PI, TAU};

use crate::geom::model::{Edge, Geometry};
use crate::geom::point::Point;
use crate::geom::segment::{SegmentIntersection, are_segments_crossing, segment_intersection};
use crate::geom::vector::Vector;

/// Edge angles below this (degrees) are straight segments.
const MIN_ARC_ANGLE: f64 = 1e-6;
/// Angle (degrees) subtended by one chord of an arc polyline.
const ARC_SEGMENT_ANGLE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularArc {
    pub center: Point,
    pub radius: f64,
    /// Polar angle of the start point about the centre (radians).
    pub start_angle: f64,
    /// Counter-clockwise sweep from start to end (radians).
    pub sweep: f64,
}

impl CircularArc {
    /// Arc from `start` to `end` with a central angle of `angle` degrees.
    ///
    /// Returns `None` for a (nearly) zero angle or coincident endpoints.
    pub fn new(start: Point, end: Point, angle: f64) -> Option<Self> {
        if !(angle > MIN_ARC_ANGLE) {
            return None;
        }
        let chord = end - start;
        let normal = chord.normalize()?.left_normal();
        let half = angle.to_radians() / 2.0;
        let radius = chord.length() / (2.0 * half.sin());
        // Negative offset puts the centre right of the chord (arcs over 180 degrees)
        let offset = radius * half.cos();
        let center = Point::new_between_2_points(start, end, 0.5) + normal * offset;
        Some(Self {
            center,
            radius,
            start_angle: (start - center).angle(),
            sweep: 2.0 * half,
        })
    }

    /// Point at relative position `t` in [0, 1] along the arc.
    pub fn point_at(&self, t: f64) -> Point {
        self.center + Vector::from_angle(self.start_angle + t * self.sweep) * self.radius
    }

    /// Whether the polar angle `theta` falls within the sweep, with an
    /// angular tolerance `tol`.
    fn covers_angle(&self, theta: f64, tol: f64) -> bool {
        let rel = (theta - self.start_angle).rem_euclid(TAU);
        rel <= self.sweep + tol || rel >= TAU - tol
    }

    pub fn contains_point(&self, p: Point, eps: f64) -> bool {
        let r = p - self.center;
        (r.length() - self.radius).abs() <= eps && self.covers_angle(r.angle(), eps / self.radius)
    }

    pub fn tangent_at_start(&self) -> Vector {
        Vector::from_angle(self.start_angle + PI / 2.0)
    }

    /// Direction leaving the end point back along the arc.
    pub fn tangent_at_end_reversed(&self) -> Vector {
        Vector::from_angle(self.start_angle + self.sweep - PI / 2.0)
    }

    fn same_circle(&self, other: &Self, eps: f64) -> bool {
        self.center.is_close_eps(&other.center, eps) && (self.radius - other.radius).abs() <= eps
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeShape {
    Line { start: Point, end: Point },
    Arc { start: Point, end: Point, arc: CircularArc },
}

impl EdgeShape {
    pub fn new(start: Point, end: Point, angle: f64) -> Self {
        match CircularArc::new(start, end, angle) {
            Some(arc) => Self::Arc { start, end, arc },
            None => Self::Line { start, end },
        }
    }

    pub fn of_edge(geometry: &Geometry, edge: &Edge) -> Self {
        let nodes = geometry.nodes();
        Self::new(nodes[edge.start].point, nodes[edge.end].point, edge.angle)
    }

    pub fn start(&self) -> Point {
        match self {
            Self::Line { start, .. } | Self::Arc { start, .. } => *start,
        }
    }

    pub fn end(&self) -> Point {
        match self {
            Self::Line { end, .. } | Self::Arc { end, .. } => *end,
        }
    }

    /// Direction in which the edge leaves its start node.
    pub fn direction_from_start(&self) -> Vector {
        match self {
            Self::Line { start, end } => *end - *start,
            Self::Arc { arc, .. } => arc.tangent_at_start(),
        }
    }

    /// Direction in which the edge leaves its end node, traversed backwards.
    pub fn direction_from_end(&self) -> Vector {
        match self {
            Self::Line { start, end } => *start - *end,
            Self::Arc { arc, .. } => arc.tangent_at_end_reversed(),
        }
    }

    /// Points from start to end, both included. Arcs are split into chords
    /// of at most a few degrees.
    pub fn polyline(&self) -> Vec<Point> {
        match self {
            Self::Line { start, end } => vec![*start, *end],
            Self::Arc { start, end, arc } => {
                let n = ((arc.sweep.to_degrees() / ARC_SEGMENT_ANGLE).ceil() as usize).max(2);
                let mut pts = Vec::with_capacity(n + 1);
                pts.push(*start);
                pts.extend((1..n).map(|i| arc.point_at(i as f64 / n as f64)));
                pts.push(*end);
                pts
            }
        }
    }

    pub fn contains_point(&self, p: Point, eps: f64) -> bool {
        match self {
            Self::Line { start, end } => p.is_on_segment(*start, *end, eps),
            Self::Arc { arc, .. } => arc.contains_point(p, eps),
        }
    }

    fn is_endpoint(&self, p: Point, eps: f64) -> bool {
        p.is_close_eps(&self.start(), eps) || p.is_close_eps(&self.end(), eps)
    }

    /// Where two edges cross or overlap away from their endpoints.
    ///
    /// Contacts at an endpoint are not crossings: a shared node is legal and
    /// a node touching another edge is reported on its own.
    pub fn crossing(&self, other: &Self, eps: f64) -> Option<Point> {
        if let (Self::Line { start: a1, end: a2 }, Self::Line { start: b1, end: b2 }) = (self, other) {
            if !are_segments_crossing(*a1, *a2, *b1, *b2, eps) {
                return None;
            }
            return match segment_intersection(*a1, *a2, *b1, *b2, eps) {
                SegmentIntersection::Point(pt) => {
                    (!self.is_endpoint(pt, eps) && !other.is_endpoint(pt, eps)).then_some(pt)
                }
                SegmentIntersection::Collinear(start, _) => Some(start),
                SegmentIntersection::Parallel | SegmentIntersection::None => None,
            };
        }

        if let (Self::Arc { arc: a, .. }, Self::Arc { arc: b, .. }) = (self, other)
            && a.same_circle(b, eps)
        {
            return self.arc_overlap(other, eps);
        }

        self.curve_intersections(other, eps)
            .into_iter()
            .filter(|p| self.contains_point(*p, eps) && other.contains_point(*p, eps))
            .find(|p| !self.is_endpoint(*p, eps) && !other.is_endpoint(*p, eps))
    }

    /// Intersections of the full line/circle carriers of two edges, one of
    /// them curved.
    fn curve_intersections(&self, other: &Self, eps: f64) -> Vec<Point> {
        match (self, other) {
            (Self::Line { start, end }, Self::Arc { arc, .. })
            | (Self::Arc { arc, .. }, Self::Line { start, end }) => {
                line_circle(*start, *end, arc.center, arc.radius, eps)
            }
            (Self::Arc { arc: a, .. }, Self::Arc { arc: b, .. }) => {
                circle_circle(a.center, a.radius, b.center, b.radius, eps)
            }
            (Self::Line { .. }, Self::Line { .. }) => Vec::new(),
        }
    }

    /// Overlap of two arcs on the same circle: an endpoint of one strictly
    /// inside the other, or the midpoint of one lying on the other.
    fn arc_overlap(&self, other: &Self, eps: f64) -> Option<Point> {
        let (Self::Arc { arc: a, .. }, Self::Arc { arc: b, .. }) = (self, other) else {
            return None;
        };
        let strictly_inside = |shape: &Self, p: Point| shape.contains_point(p, eps) && !shape.is_endpoint(p, eps);
        [other.start(), other.end()]
            .into_iter()
            .find(|p| strictly_inside(self, *p))
            .or_else(|| [self.start(), self.end()].into_iter().find(|p| strictly_inside(other, *p)))
            .or_else(|| {
                let mid = a.point_at(0.5);
                other.contains_point(mid, eps).then_some(mid)
            })
            .or_else(|| {
                let mid = b.point_at(0.5);
                self.contains_point(mid, eps).then_some(mid)
            })
    }
}

fn line_circle(p1: Point, p2: Point, center: Point, radius: f64, eps: f64) -> Vec<Point> {
    let d = p2 - p1;
    let f = p1 - center;
    let a = d.dot(d);
    if a == 0.0 {
        return Vec::new();
    }
    let b = 2.0 * f.dot(d);
    let c = f.dot(f) - radius * radius;
    let disc = b * b - 4.0 * a * c;
    // Tolerate tangency within eps
    if disc < -4.0 * a * eps * (2.0 * radius) {
        return Vec::new();
    }
    let root = disc.max(0.0).sqrt();
    [(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)]
        .into_iter()
        .map(|t| p1 + d * t)
        .collect()
}

fn circle_circle(c1: Point, r1: f64, c2: Point, r2: f64, eps: f64) -> Vec<Point> {
    let between = c2 - c1;
    let d = between.length();
    if d < eps || d > r1 + r2 + eps || d < (r1 - r2).abs() - eps {
        return Vec::new();
    }
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h = (r1 * r1 - a * a).max(0.0).sqrt();
    let base = c1 + between * (a / d);
    let perp = between.left_normal() * (h / d);
    vec![base + perp, base + perp * -1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::EPS;

    #[test]
    fn test_quarter_arc() {
        let arc = CircularArc::new(Point::new(1., 0.), Point::new(0., 1.), 90.).unwrap();
        assert!(arc.center.is_close(&Point::new(0., 0.)));
        assert!((arc.radius - 1.0).abs() < 1e-12);
        let mid = arc.point_at(0.5);
        assert!(mid.is_close(&Point::new(0.5f64.sqrt(), 0.5f64.sqrt())));
        assert!(arc.contains_point(mid, EPS));
        // Opposite side of the circle is not on the arc
        assert!(!arc.contains_point(Point::new(-1., 0.), EPS));
    }

    #[test]
    fn test_straight_edge_has_no_arc() {
        assert!(CircularArc::new(Point::new(0., 0.), Point::new(1., 0.), 0.).is_none());
        let shape = EdgeShape::new(Point::new(0., 0.), Point::new(1., 0.), 0.);
        assert_eq!(shape.polyline().len(), 2);
    }

    #[test]
    fn test_tangents_of_half_circles() {
        let a = Point::new(-1., 0.);
        let b = Point::new(1., 0.);
        // a -> b turning counter-clockwise runs below the chord
        let lower = EdgeShape::new(a, b, 180.);
        let upper = EdgeShape::new(b, a, 180.);
        let down = lower.direction_from_start();
        assert!(down.dx.abs() < 1e-12 && (down.dy + 1.0).abs() < 1e-12);
        let up = upper.direction_from_end();
        assert!(up.dx.abs() < 1e-12 && (up.dy - 1.0).abs() < 1e-12);
        assert!(lower.polyline().iter().all(|p| p.y <= 1e-12));
        assert!(upper.polyline().iter().all(|p| p.y >= -1e-12));
    }

    #[test]
    fn test_two_half_circles_do_not_cross() {
        let a = Point::new(-1., 0.);
        let b = Point::new(1., 0.);
        let lower = EdgeShape::new(a, b, 180.);
        let upper = EdgeShape::new(b, a, 180.);
        assert_eq!(lower.crossing(&upper, EPS), None);
    }

    #[test]
    fn test_overlapping_arcs_on_one_circle() {
        let a = EdgeShape::new(Point::new(1., 0.), Point::new(-1., 0.), 180.);
        let b = EdgeShape::new(Point::new(0., 1.), Point::new(0., -1.), 180.);
        assert!(a.crossing(&b, EPS).is_some());
    }

    #[test]
    fn test_line_crossing_an_arc() {
        let lower = EdgeShape::new(Point::new(-1., 0.), Point::new(1., 0.), 180.);
        let line = EdgeShape::new(Point::new(0., -2.), Point::new(0., 0.5), 0.);
        let hit = lower.crossing(&line, EPS).unwrap();
        assert!(hit.is_close_eps(&Point::new(0., -1.), 1e-9));
        assert!(line.crossing(&lower, EPS).is_some());

        // The chord itself only meets the arc at its endpoints
        let chord = EdgeShape::new(Point::new(-1., 0.), Point::new(1., 0.), 0.);
        assert_eq!(lower.crossing(&chord, EPS), None);
    }

    #[test]
    fn test_arcs_on_different_circles() {
        let left = EdgeShape::new(Point::new(0., -1.), Point::new(0., 1.), 180.);
        let right = EdgeShape::new(Point::new(1., 1.), Point::new(1., -1.), 180.);
        // Circles of radius 1 around (0, 0) and (1, 0) meet at x = 0.5
        let hit = left.crossing(&right, EPS);
        assert!(hit.is_some_and(|p| (p.x - 0.5).abs() < 1e-9));
    }
}
