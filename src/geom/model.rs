//! Geometry model: nodes, edges and labels as drawn by the user.
//!
//! This is pure data with adjacency queries. Topology (loops, subdomains) is
//! derived on demand by [`crate::geom::loops::resolve`] and never stored here.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::EPS;
use crate::geom::point::Point;

/// Quantization scale used by [`Geometry::fingerprint`] (≈ 1 nm for metres).
const FINGERPRINT_SCALE: f64 = 1e9;
/// Largest central angle (degrees) of a curved edge.
pub const MAX_EDGE_ANGLE: f64 = 180.0;
/// Highest polynomial order a label may request.
pub const MAX_POLYNOMIAL_ORDER: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateType {
    #[default]
    Planar,
    Axisymmetric,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("node coordinates must be finite, got ({x}, {y})")]
    NonFiniteCoordinate { x: f64, y: f64 },
    #[error("axisymmetric geometry requires the second coordinate to be >= 0, got {y}")]
    NegativeAxisymmetricCoordinate { y: f64 },
    #[error("node {0} does not exist")]
    NodeOutOfRange(usize),
    #[error("edge {0} does not exist")]
    EdgeOutOfRange(usize),
    #[error("label {0} does not exist")]
    LabelOutOfRange(usize),
    #[error("edge endpoints must be distinct (node {0})")]
    DegenerateEdge(usize),
    #[error("edge angle must be in [0, {MAX_EDGE_ANGLE}] degrees, got {0}")]
    InvalidEdgeAngle(f64),
    #[error("edge {start} -> {end} already exists")]
    DuplicateEdge { start: usize, end: usize },
    #[error("label area hint must be > 0, got {0}")]
    InvalidAreaHint(f64),
    #[error("label polynomial order must be in 1..={MAX_POLYNOMIAL_ORDER}, got {0}")]
    InvalidOrderHint(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub point: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start: usize,
    pub end: usize,
    /// Curvature angle in degrees (0 = straight segment).
    pub angle: f64,
    /// Boundary condition marker.
    pub boundary: Option<String>,
    /// Directional refinement towards this edge (number of extra levels).
    pub refinement: Option<u8>,
}

impl Edge {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            angle: 0.0,
            boundary: None,
            refinement: None,
        }
    }

    pub fn with_boundary(mut self, boundary: &str) -> Self {
        self.boundary = Some(boundary.to_string());
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_refinement(mut self, levels: u8) -> Self {
        self.refinement = Some(levels);
        self
    }

    /// Returns the endpoint opposite to `node`, if `node` is an endpoint.
    pub fn other(&self, node: usize) -> Option<usize> {
        if node == self.start {
            Some(self.end)
        } else if node == self.end {
            Some(self.start)
        } else {
            None
        }
    }

    pub fn touches(&self, node: usize) -> bool {
        self.start == node || self.end == node
    }
}

/// A point marking the interior of one subdomain.
///
/// A label without a marker declares its subdomain intentionally empty (a
/// hole that is not meshed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub point: Point,
    pub marker: Option<String>,
    /// Requested maximum element area.
    pub area_hint: Option<f64>,
    /// Requested polynomial order.
    pub order_hint: Option<u8>,
}

impl Label {
    pub fn new(point: Point, marker: &str) -> Self {
        Self {
            point,
            marker: Some(marker.to_string()),
            area_hint: None,
            order_hint: None,
        }
    }

    /// Label that marks its subdomain as a hole.
    pub fn hole(point: Point) -> Self {
        Self {
            point,
            marker: None,
            area_hint: None,
            order_hint: None,
        }
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area_hint = Some(area);
        self
    }

    pub fn with_order(mut self, order: u8) -> Self {
        self.order_hint = Some(order);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    coordinate_type: CoordinateType,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    labels: Vec<Label>,
}

impl Geometry {
    pub fn new(coordinate_type: CoordinateType) -> Self {
        Self {
            coordinate_type,
            ..Default::default()
        }
    }

    pub fn coordinate_type(&self) -> CoordinateType {
        self.coordinate_type
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn node_point(&self, node: usize) -> Result<Point, GeometryError> {
        self.nodes
            .get(node)
            .map(|n| n.point)
            .ok_or(GeometryError::NodeOutOfRange(node))
    }

    /// Returns the index of a node at `point` (within `eps`), if any.
    pub fn find_node(&self, point: Point, eps: f64) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.point.is_close_eps(&point, eps))
    }

    /// Adds a node and returns its index.
    ///
    /// A node coinciding with an existing one is not duplicated; the index of
    /// the existing node is returned instead.
    pub fn add_node(&mut self, point: Point) -> Result<usize, GeometryError> {
        self.check_point(point)?;
        if let Some(existing) = self.find_node(point, EPS) {
            return Ok(existing);
        }
        self.nodes.push(Node { point });
        Ok(self.nodes.len() - 1)
    }

    /// Moves an existing node.
    pub fn move_node(&mut self, node: usize, point: Point) -> Result<(), GeometryError> {
        self.check_point(point)?;
        let n = self
            .nodes
            .get_mut(node)
            .ok_or(GeometryError::NodeOutOfRange(node))?;
        n.point = point;
        Ok(())
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<usize, GeometryError> {
        for node in [edge.start, edge.end] {
            if node >= self.nodes.len() {
                return Err(GeometryError::NodeOutOfRange(node));
            }
        }
        if edge.start == edge.end {
            return Err(GeometryError::DegenerateEdge(edge.start));
        }
        if !(0.0..=MAX_EDGE_ANGLE).contains(&edge.angle) {
            return Err(GeometryError::InvalidEdgeAngle(edge.angle));
        }
        if self
            .edges
            .iter()
            .any(|e| e.start == edge.start && e.end == edge.end)
        {
            return Err(GeometryError::DuplicateEdge {
                start: edge.start,
                end: edge.end,
            });
        }
        self.edges.push(edge);
        Ok(self.edges.len() - 1)
    }

    pub fn add_label(&mut self, label: Label) -> Result<usize, GeometryError> {
        self.check_point(label.point)?;
        if let Some(area) = label.area_hint
            && !(area > 0.0)
        {
            return Err(GeometryError::InvalidAreaHint(area));
        }
        if let Some(order) = label.order_hint
            && !(1..=MAX_POLYNOMIAL_ORDER).contains(&order)
        {
            return Err(GeometryError::InvalidOrderHint(order));
        }
        self.labels.push(label);
        Ok(self.labels.len() - 1)
    }

    /// Removes a node together with all edges incident to it.
    ///
    /// Node indices above `node` shift down by one; edges are re-indexed.
    pub fn remove_node(&mut self, node: usize) -> Result<Node, GeometryError> {
        if node >= self.nodes.len() {
            return Err(GeometryError::NodeOutOfRange(node));
        }
        self.edges.retain(|e| !e.touches(node));
        for e in self.edges.iter_mut() {
            if e.start > node {
                e.start -= 1;
            }
            if e.end > node {
                e.end -= 1;
            }
        }
        Ok(self.nodes.remove(node))
    }

    pub fn remove_edge(&mut self, edge: usize) -> Result<Edge, GeometryError> {
        if edge >= self.edges.len() {
            return Err(GeometryError::EdgeOutOfRange(edge));
        }
        Ok(self.edges.remove(edge))
    }

    pub fn remove_label(&mut self, label: usize) -> Result<Label, GeometryError> {
        if label >= self.labels.len() {
            return Err(GeometryError::LabelOutOfRange(label));
        }
        Ok(self.labels.remove(label))
    }

    /// Indices of edges incident to `node`.
    pub fn edges_at(&self, node: usize) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.touches(node))
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of incident edges (undirected degree).
    pub fn degree(&self, node: usize) -> usize {
        self.edges.iter().filter(|e| e.touches(node)).count()
    }

    /// Nodes connected to `node` by an edge (sorted, without duplicates).
    pub fn neighbors(&self, node: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self.edges.iter().filter_map(|e| e.other(node)).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Undirected adjacency list: for each node, `(edge index, other node)`.
    pub fn adjacency(&self) -> Vec<Vec<(usize, usize)>> {
        let mut adj = vec![Vec::new(); self.nodes.len()];
        for (i, e) in self.edges.iter().enumerate() {
            adj[e.start].push((i, e.end));
            adj[e.end].push((i, e.start));
        }
        adj
    }

    /// Stable hash of the geometry (coordinates quantized, markers included).
    ///
    /// Two geometries with the same fingerprint produce the same mesh, so this
    /// is used as the mesh cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.coordinate_type.hash(&mut h);
        self.nodes.len().hash(&mut h);
        for n in &self.nodes {
            hash_point(n.point, &mut h);
        }
        self.edges.len().hash(&mut h);
        for e in &self.edges {
            e.start.hash(&mut h);
            e.end.hash(&mut h);
            ((e.angle * FINGERPRINT_SCALE).round() as i64).hash(&mut h);
            e.boundary.hash(&mut h);
            e.refinement.hash(&mut h);
        }
        self.labels.len().hash(&mut h);
        for l in &self.labels {
            hash_point(l.point, &mut h);
            l.marker.hash(&mut h);
            l.area_hint
                .map(|a| (a * FINGERPRINT_SCALE).round() as i64)
                .hash(&mut h);
            l.order_hint.hash(&mut h);
        }
        h.finish()
    }

    fn check_point(&self, point: Point) -> Result<(), GeometryError> {
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(GeometryError::NonFiniteCoordinate {
                x: point.x,
                y: point.y,
            });
        }
        if self.coordinate_type == CoordinateType::Axisymmetric && point.y < -EPS {
            return Err(GeometryError::NegativeAxisymmetricCoordinate { y: point.y });
        }
        Ok(())
    }
}

fn hash_point(p: Point, h: &mut DefaultHasher) {
    ((p.x * FINGERPRINT_SCALE).round() as i64).hash(h);
    ((p.y * FINGERPRINT_SCALE).round() as i64).hash(h);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Geometry {
        let mut g = Geometry::new(CoordinateType::Planar);
        let n0 = g.add_node(Point::new(0., 0.)).unwrap();
        let n1 = g.add_node(Point::new(1., 0.)).unwrap();
        let n2 = g.add_node(Point::new(1., 1.)).unwrap();
        let n3 = g.add_node(Point::new(0., 1.)).unwrap();
        g.add_edge(Edge::new(n0, n1)).unwrap();
        g.add_edge(Edge::new(n1, n2)).unwrap();
        g.add_edge(Edge::new(n2, n3)).unwrap();
        g.add_edge(Edge::new(n3, n0)).unwrap();
        g
    }

    #[test]
    fn test_coincident_nodes_are_merged() {
        let mut g = Geometry::new(CoordinateType::Planar);
        let a = g.add_node(Point::new(1., 1.)).unwrap();
        let b = g.add_node(Point::new(1., 1. + 1e-12)).unwrap();
        assert_eq!(a, b);
        assert_eq!(g.nodes().len(), 1);
    }

    #[test]
    fn test_axisymmetric_rejects_negative_coordinate() {
        let mut g = Geometry::new(CoordinateType::Axisymmetric);
        assert!(g.add_node(Point::new(1., 0.)).is_ok());
        assert!(g.add_node(Point::new(-1., 2.)).is_ok());
        assert_eq!(
            g.add_node(Point::new(1., -0.5)),
            Err(GeometryError::NegativeAxisymmetricCoordinate { y: -0.5 })
        );
    }

    #[test]
    fn test_edge_invariants() {
        let mut g = unit_square();
        assert_eq!(g.add_edge(Edge::new(0, 0)), Err(GeometryError::DegenerateEdge(0)));
        assert_eq!(
            g.add_edge(Edge::new(0, 1)),
            Err(GeometryError::DuplicateEdge { start: 0, end: 1 })
        );
        // Same endpoints in the opposite order are allowed
        assert!(g.add_edge(Edge::new(1, 0)).is_ok());
        assert_eq!(g.add_edge(Edge::new(0, 9)), Err(GeometryError::NodeOutOfRange(9)));
        assert_eq!(
            g.add_edge(Edge::new(0, 2).with_angle(270.)),
            Err(GeometryError::InvalidEdgeAngle(270.))
        );
        assert!(g.add_edge(Edge::new(0, 2).with_angle(180.)).is_ok());
    }

    #[test]
    fn test_label_hints_are_validated() {
        let mut g = unit_square();
        let p = Point::new(0.5, 0.5);
        assert_eq!(
            g.add_label(Label::new(p, "copper").with_area(0.0)),
            Err(GeometryError::InvalidAreaHint(0.0))
        );
        assert_eq!(
            g.add_label(Label::new(p, "copper").with_order(0)),
            Err(GeometryError::InvalidOrderHint(0))
        );
        assert_eq!(g.add_label(Label::new(p, "copper").with_order(3)), Ok(0));
    }

    #[test]
    fn test_adjacency_queries() {
        let g = unit_square();
        assert_eq!(g.degree(0), 2);
        assert_eq!(g.neighbors(0), vec![1, 3]);
        assert_eq!(g.edges_at(2), vec![1, 2]);
        let adj = g.adjacency();
        assert_eq!(adj[1], vec![(0, 0), (1, 2)]);
    }

    #[test]
    fn test_remove_node_reindexes_edges() {
        let mut g = unit_square();
        g.remove_node(1).unwrap();
        assert_eq!(g.nodes().len(), 3);
        assert_eq!(g.edges().len(), 2);
        // Former edges 2->3 and 3->0 become 1->2 and 2->0
        assert_eq!((g.edges()[0].start, g.edges()[0].end), (1, 2));
        assert_eq!((g.edges()[1].start, g.edges()[1].end), (2, 0));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = unit_square();
        let b = unit_square();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = unit_square();
        c.move_node(2, Point::new(1., 1.5)).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
