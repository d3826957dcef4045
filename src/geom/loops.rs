//! Loop resolver: turns the drawn edge graph into closed loops and subdomains.
//!
//! Faces are traced on the planar edge graph with half-edges. At every node
//! the outgoing half-edges are ordered by the angle of their tangent, so
//! curved edges sharing a chord are told apart. Arriving along
//! `u -> v`, the walk continues with the outgoing edge that makes the tightest
//! left turn relative to the incoming direction. Every bounded face comes out
//! counter-clockwise; the unbounded face of each connected component comes out
//! clockwise and is kept as that component's boundary loop (used as a hole by
//! the enclosing subdomain).
//!
//! A connected component is placed inside another by testing one of its own
//! nodes against the faces of the other components, so the test point never
//! depends on how close the components are. Label placement uses the same
//! parity test from [`crate::geom::containment`] on arc-sampled polygons. All
//! problems are collected as [`Diagnostic`]s; nothing is thrown.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::debug;

use crate::geom::arc::EdgeShape;
use crate::geom::containment::{ParityAmbiguous, is_point_inside_polygon};
use crate::geom::model::Geometry;
use crate::geom::point::{Point, signed_area};

/// Tunables of the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveOptions {
    /// Distance tolerance for "point on edge" and "same position" tests. Also
    /// the angular bin width (radians) used to order edges around a node, so
    /// near-duplicate directions are ordered by edge index instead of by noise.
    pub epsilon: f64,
    /// Extra rays cast by the parity test before giving up.
    pub parity_retries: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            epsilon: 1e-9,
            parity_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

/// An edge traversed in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectedEdge {
    pub edge: usize,
    pub direction: Direction,
}

impl DirectedEdge {
    fn from_half_edge(h: usize) -> Self {
        Self {
            edge: h / 2,
            direction: if h % 2 == 0 {
                Direction::Forward
            } else {
                Direction::Reverse
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// Bounded, counter-clockwise minimal face.
    Face,
    /// Clockwise outer boundary of a connected component.
    Boundary,
}

/// Closed cyclic sequence of directed edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub edges: Vec<DirectedEdge>,
    /// Start node of each directed edge (same length as `edges`).
    pub nodes: Vec<usize>,
    /// Signed area (positive = counter-clockwise).
    pub area: f64,
    pub kind: LoopKind,
    /// Connected component the loop belongs to.
    pub component: usize,
}

impl Loop {
    /// Closed polygon of the loop (last point not repeated). Arcs are
    /// replaced by polylines.
    pub fn points(&self, geometry: &Geometry) -> Vec<Point> {
        self.edges
            .iter()
            .flat_map(|de| {
                let mut pts = EdgeShape::of_edge(geometry, &geometry.edges()[de.edge]).polyline();
                if de.direction == Direction::Reverse {
                    pts.reverse();
                }
                pts.pop();
                pts
            })
            .collect()
    }

    pub fn is_counter_clockwise(&self) -> bool {
        self.area > 0.0
    }
}

/// Marker resolution of one subdomain.
#[derive(Debug, Clone, PartialEq)]
pub enum SubdomainMarker {
    /// Exactly one label with a material marker.
    Material { label: usize, marker: String },
    /// Exactly one label without a marker: the subdomain is left unmeshed.
    Hole { label: usize },
    /// No label inside.
    Missing,
    /// More than one label inside.
    Ambiguous(Vec<usize>),
}

impl SubdomainMarker {
    pub fn marker(&self) -> Option<&str> {
        match self {
            Self::Material { marker, .. } => Some(marker),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<usize> {
        match self {
            Self::Material { label, .. } | Self::Hole { label } => Some(*label),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Material { .. } | Self::Hole { .. })
    }
}

/// Region bounded by one outer loop and zero or more hole loops.
#[derive(Debug, Clone, PartialEq)]
pub struct Subdomain {
    /// Index into [`Resolution::loops`] (a [`LoopKind::Face`]).
    pub outer: usize,
    /// Indices into [`Resolution::loops`] (each a [`LoopKind::Boundary`]).
    pub holes: Vec<usize>,
    pub marker: SubdomainMarker,
    /// Outer area minus hole areas.
    pub area: f64,
}

/// A topology problem found while resolving.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("node {node} is isolated (no edges)")]
    IsolatedNode { node: usize },
    #[error("node {node} is dangling (only one edge)")]
    DanglingNode { node: usize },
    #[error("edge {edge} does not belong to any closed loop")]
    DanglingEdge { edge: usize },
    #[error("node {node} lies on edge {edge} without being one of its endpoints")]
    UnconnectedNodeOnEdge { node: usize, edge: usize },
    #[error("edges {first} and {second} cross at ({x}, {y})")]
    EdgeCrossing {
        first: usize,
        second: usize,
        x: f64,
        y: f64,
    },
    #[error("subdomain {subdomain} has no label")]
    NoMarkerForSubdomain { subdomain: usize },
    #[error("subdomain {subdomain} has multiple labels {labels:?}")]
    MultipleMarkersInSubdomain { subdomain: usize, labels: Vec<usize> },
    #[error("label {label} is not inside any subdomain")]
    LabelOutsideGeometry { label: usize },
    #[error(transparent)]
    ParityAmbiguous(#[from] ParityAmbiguous),
}

impl Diagnostic {
    /// Fatal diagnostics block mesh generation. An isolated node does not
    /// affect topology and is only reported.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::IsolatedNode { .. })
    }
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub loops: Vec<Loop>,
    pub subdomains: Vec<Subdomain>,
    pub diagnostics: Vec<Diagnostic>,
    /// For each label, the subdomain it was assigned to.
    pub label_subdomain: Vec<Option<usize>>,
}

impl Resolution {
    /// True when no fatal diagnostic was found.
    pub fn is_valid(&self) -> bool {
        self.diagnostics.iter().all(|d| !d.is_fatal())
    }

    pub fn fatal_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_fatal())
    }

    /// Subdomains covering `point` (inside outer loop and outside all holes).
    pub fn subdomains_at(
        &self,
        geometry: &Geometry,
        point: Point,
        options: &ResolveOptions,
    ) -> Result<Vec<usize>, ParityAmbiguous> {
        let mut out = Vec::new();
        for (i, sd) in self.subdomains.iter().enumerate() {
            if self.is_inside_subdomain(geometry, sd, point, options)? {
                out.push(i);
            }
        }
        Ok(out)
    }

    fn is_inside_subdomain(
        &self,
        geometry: &Geometry,
        subdomain: &Subdomain,
        point: Point,
        options: &ResolveOptions,
    ) -> Result<bool, ParityAmbiguous> {
        let outer = self.loops[subdomain.outer].points(geometry);
        if !is_point_inside_polygon(point, &outer, options.epsilon, options.parity_retries)? {
            return Ok(false);
        }
        for &h in &subdomain.holes {
            let hole = self.loops[h].points(geometry);
            if is_point_inside_polygon(point, &hole, options.epsilon, options.parity_retries)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Resolves loops, subdomains and label markers of a geometry.
pub fn resolve(geometry: &Geometry, options: &ResolveOptions) -> Resolution {
    let mut diagnostics = Vec::new();

    let active = prune_dangling(geometry, &mut diagnostics);
    let loops = trace_loops(geometry, &active, options);
    let subdomains = nest_loops(geometry, &loops, options, &mut diagnostics);

    let mut resolution = Resolution {
        loops,
        subdomains,
        diagnostics: Vec::new(),
        label_subdomain: vec![None; geometry.labels().len()],
    };
    assign_labels(geometry, &mut resolution, options, &mut diagnostics);
    check_incidence(geometry, options, &mut diagnostics);

    debug!(
        loops = resolution.loops.len(),
        subdomains = resolution.subdomains.len(),
        diagnostics = diagnostics.len(),
        "Resolved geometry topology"
    );
    resolution.diagnostics = diagnostics;
    resolution
}

/// Flags degree-0/1 nodes and strips tree-like parts of the graph.
///
/// Returns the per-edge "active" mask of edges that can belong to a loop.
fn prune_dangling(geometry: &Geometry, diagnostics: &mut Vec<Diagnostic>) -> Vec<bool> {
    let adjacency = geometry.adjacency();
    let mut degree: Vec<usize> = adjacency.iter().map(|a| a.len()).collect();
    let mut active = vec![true; geometry.edges().len()];
    let mut queue = VecDeque::new();

    for (node, &d) in degree.iter().enumerate() {
        match d {
            0 => diagnostics.push(Diagnostic::IsolatedNode { node }),
            1 => {
                diagnostics.push(Diagnostic::DanglingNode { node });
                queue.push_back(node);
            }
            _ => {}
        }
    }

    while let Some(node) = queue.pop_front() {
        if degree[node] != 1 {
            continue;
        }
        let Some(&(edge, other)) = adjacency[node].iter().find(|(e, _)| active[*e]) else {
            continue;
        };
        active[edge] = false;
        diagnostics.push(Diagnostic::DanglingEdge { edge });
        degree[node] -= 1;
        degree[other] -= 1;
        if degree[other] == 1 {
            queue.push_back(other);
        }
    }

    active
}

fn half_edge_nodes(geometry: &Geometry, h: usize) -> (usize, usize) {
    let e = &geometry.edges()[h / 2];
    if h % 2 == 0 {
        (e.start, e.end)
    } else {
        (e.end, e.start)
    }
}

fn trace_loops(geometry: &Geometry, active: &[bool], options: &ResolveOptions) -> Vec<Loop> {
    let num_half = 2 * geometry.edges().len();
    let shapes: Vec<EdgeShape> = geometry
        .edges()
        .iter()
        .map(|e| EdgeShape::of_edge(geometry, e))
        .collect();

    // Outgoing half-edges per node, counter-clockwise by tangent angle
    let mut outgoing: Vec<Vec<(i64, usize)>> = vec![Vec::new(); geometry.nodes().len()];
    for h in 0..num_half {
        if !active[h / 2] {
            continue;
        }
        let (from, _) = half_edge_nodes(geometry, h);
        let direction = if h % 2 == 0 {
            shapes[h / 2].direction_from_start()
        } else {
            shapes[h / 2].direction_from_end()
        };
        let bin = (direction.angle() / options.epsilon.max(f64::EPSILON)).round() as i64;
        outgoing[from].push((bin, h));
    }
    let mut position = vec![0usize; num_half];
    for out in outgoing.iter_mut() {
        out.sort_unstable();
        for (i, &(_, h)) in out.iter().enumerate() {
            position[h] = i;
        }
    }

    let component = connected_components(geometry, active);

    let mut visited = vec![false; num_half];
    let mut loops = Vec::new();
    for start in 0..num_half {
        if !active[start / 2] || visited[start] {
            continue;
        }
        let mut half_edges = Vec::new();
        let mut h = start;
        loop {
            visited[h] = true;
            half_edges.push(h);
            let (_, v) = half_edge_nodes(geometry, h);
            let twin = h ^ 1;
            let around = &outgoing[v];
            // Previous in counter-clockwise order = tightest left turn
            let next = around[(position[twin] + around.len() - 1) % around.len()].1;
            if next == start || half_edges.len() > num_half {
                break;
            }
            h = next;
        }

        let loop_nodes: Vec<usize> = half_edges
            .iter()
            .map(|&h| half_edge_nodes(geometry, h).0)
            .collect();
        let mut traced = Loop {
            edges: half_edges
                .iter()
                .map(|&h| DirectedEdge::from_half_edge(h))
                .collect(),
            component: component[loop_nodes[0]],
            nodes: loop_nodes,
            area: 0.0,
            kind: LoopKind::Boundary,
        };
        traced.area = signed_area(&traced.points(geometry));
        if traced.area > options.epsilon {
            traced.kind = LoopKind::Face;
        }
        loops.push(traced);
    }
    loops
}

/// Component id per node, counting active edges only.
fn connected_components(geometry: &Geometry, active: &[bool]) -> Vec<usize> {
    let adjacency = geometry.adjacency();
    let mut component = vec![usize::MAX; geometry.nodes().len()];
    let mut next_id = 0;
    for seed in 0..component.len() {
        if component[seed] != usize::MAX {
            continue;
        }
        component[seed] = next_id;
        let mut stack = vec![seed];
        while let Some(n) = stack.pop() {
            for &(e, other) in &adjacency[n] {
                if active[e] && component[other] == usize::MAX {
                    component[other] = next_id;
                    stack.push(other);
                }
            }
        }
        next_id += 1;
    }
    component
}

/// Places every connected component inside the smallest face of another
/// component that contains it, and builds one subdomain per face.
///
/// The outer boundary of a component (its most negative loop) is tested
/// through one of its nodes. A node can only touch another component through
/// a crossing or a node lying on an edge, both reported by
/// [`check_incidence`].
fn nest_loops(
    geometry: &Geometry,
    loops: &[Loop],
    options: &ResolveOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Subdomain> {
    let points: Vec<Vec<Point>> = loops.iter().map(|l| l.points(geometry)).collect();
    let faces: Vec<usize> = (0..loops.len())
        .filter(|&i| loops[i].kind == LoopKind::Face)
        .collect();

    let components = loops.iter().map(|l| l.component + 1).max().unwrap_or(0);
    let mut outer_boundary: Vec<Option<usize>> = vec![None; components];
    for (i, l) in loops.iter().enumerate() {
        if l.kind != LoopKind::Boundary || l.area >= -options.epsilon {
            continue;
        }
        let slot = &mut outer_boundary[l.component];
        if slot.is_none_or(|b| l.area < loops[b].area) {
            *slot = Some(i);
        }
    }

    let mut holes_of: Vec<Vec<usize>> = vec![Vec::new(); loops.len()];
    let mut parent_component: Vec<Option<usize>> = vec![None; components];
    for (component, boundary) in outer_boundary.iter().enumerate() {
        let Some(b) = *boundary else {
            continue;
        };
        let sample = geometry.nodes()[loops[b].nodes[0]].point;

        let mut parent: Option<usize> = None;
        for &f in &faces {
            if loops[f].component == component {
                continue;
            }
            match is_point_inside_polygon(sample, &points[f], options.epsilon, options.parity_retries) {
                Ok(true) => {
                    let smaller = parent.is_none_or(|p| loops[f].area < loops[p].area);
                    if smaller {
                        parent = Some(f);
                    }
                }
                Ok(false) => {}
                Err(e) => diagnostics.push(e.into()),
            }
        }
        if let Some(p) = parent {
            holes_of[p].push(b);
            parent_component[component] = Some(loops[p].component);
        }
    }
    debug_assert!(
        is_forest(&parent_component),
        "component nesting must not contain cycles"
    );

    faces
        .iter()
        .map(|&f| {
            let holes = std::mem::take(&mut holes_of[f]);
            let hole_area: f64 = holes.iter().map(|&h| loops[h].area.abs()).sum();
            Subdomain {
                outer: f,
                area: loops[f].area - hole_area,
                holes,
                marker: SubdomainMarker::Missing,
            }
        })
        .collect()
}

/// True when following parent links from any component ends at a root.
fn is_forest(parent: &[Option<usize>]) -> bool {
    (0..parent.len()).all(|start| {
        let mut current = start;
        for _ in 0..parent.len() {
            match parent[current] {
                Some(p) => current = p,
                None => return true,
            }
        }
        false
    })
}

fn assign_labels(
    geometry: &Geometry,
    resolution: &mut Resolution,
    options: &ResolveOptions,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let labels = geometry.labels();
    let mut ambiguous_label = vec![false; labels.len()];
    let mut matches: Vec<Vec<usize>> = vec![Vec::new(); resolution.subdomains.len()];

    for (s, sd) in resolution.subdomains.iter().enumerate() {
        for (l, label) in labels.iter().enumerate() {
            match resolution.is_inside_subdomain(geometry, sd, label.point, options) {
                Ok(true) => matches[s].push(l),
                Ok(false) => {}
                Err(e) => {
                    if !ambiguous_label[l] {
                        ambiguous_label[l] = true;
                        diagnostics.push(e.into());
                    }
                }
            }
        }
    }

    for (s, found) in matches.into_iter().enumerate() {
        let marker = match found.as_slice() {
            [] => {
                diagnostics.push(Diagnostic::NoMarkerForSubdomain { subdomain: s });
                SubdomainMarker::Missing
            }
            [l] => {
                resolution.label_subdomain[*l] = Some(s);
                match &labels[*l].marker {
                    Some(marker) => SubdomainMarker::Material {
                        label: *l,
                        marker: marker.clone(),
                    },
                    None => SubdomainMarker::Hole { label: *l },
                }
            }
            _ => {
                diagnostics.push(Diagnostic::MultipleMarkersInSubdomain {
                    subdomain: s,
                    labels: found.clone(),
                });
                for &l in &found {
                    resolution.label_subdomain[l] = Some(s);
                }
                SubdomainMarker::Ambiguous(found)
            }
        };
        resolution.subdomains[s].marker = marker;
    }

    for (l, assigned) in resolution.label_subdomain.iter().enumerate() {
        if assigned.is_none() && !ambiguous_label[l] {
            diagnostics.push(Diagnostic::LabelOutsideGeometry { label: l });
        }
    }
}

/// Detects nodes lying on foreign edges and edges crossing each other.
fn check_incidence(geometry: &Geometry, options: &ResolveOptions, diagnostics: &mut Vec<Diagnostic>) {
    let eps = options.epsilon;
    let edges = geometry.edges();
    let shapes: Vec<EdgeShape> = edges.iter().map(|e| EdgeShape::of_edge(geometry, e)).collect();

    for (n, node) in geometry.nodes().iter().enumerate() {
        for (e, edge) in edges.iter().enumerate() {
            if !edge.touches(n) && shapes[e].contains_point(node.point, eps) {
                diagnostics.push(Diagnostic::UnconnectedNodeOnEdge { node: n, edge: e });
            }
        }
    }

    for i in 0..shapes.len() {
        for j in (i + 1)..shapes.len() {
            if let Some(at) = shapes[i].crossing(&shapes[j], eps) {
                diagnostics.push(Diagnostic::EdgeCrossing {
                    first: i,
                    second: j,
                    x: at.x,
                    y: at.y,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::model::{CoordinateType, Edge, Label};

    fn add_polygon(g: &mut Geometry, pts: &[(f64, f64)]) -> Vec<usize> {
        let ids: Vec<usize> = pts
            .iter()
            .map(|&(x, y)| g.add_node(Point::new(x, y)).unwrap())
            .collect();
        for i in 0..ids.len() {
            g.add_edge(Edge::new(ids[i], ids[(i + 1) % ids.len()])).unwrap();
        }
        ids
    }

    fn square(x0: f64, y0: f64, size: f64) -> Vec<(f64, f64)> {
        vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
        ]
    }

    #[test]
    fn test_unit_square() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 1.));
        g.add_label(Label::new(Point::new(0.5, 0.5), "air")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.is_valid(), "{:?}", res.diagnostics);
        assert_eq!(res.loops.len(), 2);
        assert_eq!(res.subdomains.len(), 1);
        assert_eq!(res.subdomains[0].marker.marker(), Some("air"));
        assert!((res.subdomains[0].area - 1.0).abs() < 1e-12);
        assert_eq!(res.label_subdomain, vec![Some(0)]);
    }

    #[test]
    fn test_every_edge_traversed_once_per_direction() {
        // Two squares sharing an edge
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 1.));
        let n1 = g.find_node(Point::new(1., 0.), 1e-9).unwrap();
        let n2 = g.find_node(Point::new(1., 1.), 1e-9).unwrap();
        let a = g.add_node(Point::new(2., 0.)).unwrap();
        let b = g.add_node(Point::new(2., 1.)).unwrap();
        g.add_edge(Edge::new(n1, a)).unwrap();
        g.add_edge(Edge::new(a, b)).unwrap();
        g.add_edge(Edge::new(b, n2)).unwrap();
        g.add_label(Label::new(Point::new(0.5, 0.5), "left")).unwrap();
        g.add_label(Label::new(Point::new(1.5, 0.5), "right")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.is_valid(), "{:?}", res.diagnostics);
        assert_eq!(res.subdomains.len(), 2);

        let mut seen = std::collections::HashSet::new();
        for l in &res.loops {
            for de in &l.edges {
                assert!(seen.insert(*de), "directed edge {de:?} used twice");
            }
        }
        assert_eq!(seen.len(), 2 * g.edges().len());
    }

    #[test]
    fn test_square_with_hole() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 4.));
        add_polygon(&mut g, &square(1., 1., 1.));
        g.add_label(Label::new(Point::new(3., 3.), "iron")).unwrap();
        g.add_label(Label::new(Point::new(1.5, 1.5), "copper")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.is_valid(), "{:?}", res.diagnostics);
        assert_eq!(res.subdomains.len(), 2);

        let outer = res
            .subdomains
            .iter()
            .find(|s| s.marker.marker() == Some("iron"))
            .unwrap();
        assert_eq!(outer.holes.len(), 1);
        assert!((outer.area - 15.0).abs() < 1e-9);
        let inner = res
            .subdomains
            .iter()
            .find(|s| s.marker.marker() == Some("copper"))
            .unwrap();
        assert!(inner.holes.is_empty());
        assert!((inner.area - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unlabelled_hole_is_reported() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 4.));
        add_polygon(&mut g, &square(1., 1., 1.));
        g.add_label(Label::new(Point::new(3., 3.), "iron")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(!res.is_valid());
        assert!(
            res.diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::NoMarkerForSubdomain { .. }))
        );
    }

    #[test]
    fn test_hole_label_marks_unmeshed_subdomain() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 4.));
        add_polygon(&mut g, &square(1., 1., 1.));
        g.add_label(Label::new(Point::new(3., 3.), "iron")).unwrap();
        g.add_label(Label::hole(Point::new(1.5, 1.5))).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.is_valid(), "{:?}", res.diagnostics);
        assert!(
            res.subdomains
                .iter()
                .any(|s| matches!(s.marker, SubdomainMarker::Hole { label: 1 }))
        );
    }

    #[test]
    fn test_multiple_labels_in_subdomain() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 1.));
        g.add_label(Label::new(Point::new(0.2, 0.2), "a")).unwrap();
        g.add_label(Label::new(Point::new(0.8, 0.8), "b")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert_eq!(
            res.diagnostics,
            vec![Diagnostic::MultipleMarkersInSubdomain {
                subdomain: 0,
                labels: vec![0, 1]
            }]
        );
        assert_eq!(res.subdomains[0].marker, SubdomainMarker::Ambiguous(vec![0, 1]));
    }

    #[test]
    fn test_dangling_edge() {
        let mut g = Geometry::new(CoordinateType::Planar);
        let ids = add_polygon(&mut g, &square(0., 0., 1.));
        let tail = g.add_node(Point::new(2., 2.)).unwrap();
        let e = g.add_edge(Edge::new(ids[2], tail)).unwrap();
        g.add_label(Label::new(Point::new(0.5, 0.5), "air")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.diagnostics.contains(&Diagnostic::DanglingNode { node: tail }));
        assert!(res.diagnostics.contains(&Diagnostic::DanglingEdge { edge: e }));
        // The square is still resolved, the tail does not create a subdomain
        assert_eq!(res.subdomains.len(), 1);
        for l in &res.loops {
            assert!(l.edges.iter().all(|de| de.edge != e));
        }
    }

    #[test]
    fn test_open_polyline_has_no_subdomain() {
        let mut g = Geometry::new(CoordinateType::Planar);
        let a = g.add_node(Point::new(0., 0.)).unwrap();
        let b = g.add_node(Point::new(1., 0.)).unwrap();
        let c = g.add_node(Point::new(1., 1.)).unwrap();
        g.add_edge(Edge::new(a, b)).unwrap();
        g.add_edge(Edge::new(b, c)).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.subdomains.is_empty());
        assert!(res.loops.is_empty());
        let dangling_edges = res
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::DanglingEdge { .. }))
            .count();
        assert_eq!(dangling_edges, 2);
    }

    #[test]
    fn test_node_on_edge() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 2.));
        let stray = g.add_node(Point::new(1., 0.)).unwrap();
        g.add_label(Label::new(Point::new(1., 1.), "air")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(
            res.diagnostics
                .contains(&Diagnostic::UnconnectedNodeOnEdge { node: stray, edge: 0 })
        );
        assert!(res.diagnostics.contains(&Diagnostic::IsolatedNode { node: stray }));
    }

    #[test]
    fn test_crossing_edges() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 2.));
        let a = g.add_node(Point::new(1., -1.)).unwrap();
        let b = g.add_node(Point::new(1., 3.)).unwrap();
        g.add_edge(Edge::new(a, b)).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        let crossings = res
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::EdgeCrossing { .. }))
            .count();
        assert_eq!(crossings, 2);
        assert!(!res.is_valid());
    }

    #[test]
    fn test_label_outside_geometry() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 1.));
        g.add_label(Label::new(Point::new(0.5, 0.5), "air")).unwrap();
        g.add_label(Label::new(Point::new(5., 5.), "lost")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert_eq!(res.diagnostics, vec![Diagnostic::LabelOutsideGeometry { label: 1 }]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 4.));
        add_polygon(&mut g, &square(1., 1., 1.));
        g.add_label(Label::new(Point::new(3., 3.), "iron")).unwrap();
        g.add_label(Label::new(Point::new(1.5, 1.5), "copper")).unwrap();

        let opts = ResolveOptions::default();
        assert_eq!(resolve(&g, &opts), resolve(&g, &opts));
    }

    #[test]
    fn test_subdomains_at() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 4.));
        add_polygon(&mut g, &square(1., 1., 1.));
        g.add_label(Label::new(Point::new(3., 3.), "iron")).unwrap();
        g.add_label(Label::new(Point::new(1.5, 1.5), "copper")).unwrap();

        let opts = ResolveOptions::default();
        let res = resolve(&g, &opts);
        for p in [Point::new(0.5, 3.5), Point::new(1.25, 1.75), Point::new(3.9, 0.1)] {
            assert_eq!(res.subdomains_at(&g, p, &opts).unwrap().len(), 1);
        }
        assert!(res.subdomains_at(&g, Point::new(5., 5.), &opts).unwrap().is_empty());
    }

    #[test]
    fn test_component_close_to_enclosing_edge() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 10.));
        add_polygon(&mut g, &[(4.9, 0.05), (5.1, 0.05), (5.1, 1.0), (4.9, 1.0)]);
        g.add_label(Label::new(Point::new(2., 8.), "air")).unwrap();
        g.add_label(Label::new(Point::new(5., 0.5), "copper")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
        assert_eq!(res.subdomains.len(), 2);
        assert!(res.subdomains.iter().all(|s| s.area > 0.0));

        let air = res.label_subdomain[0].unwrap();
        let copper = res.label_subdomain[1].unwrap();
        assert_ne!(air, copper);
        assert_eq!(res.subdomains[air].holes.len(), 1);
        assert!(res.subdomains[copper].holes.is_empty());
        assert!((res.subdomains[air].area - (100.0 - 0.2 * 0.95)).abs() < 1e-9);
    }

    #[test]
    fn test_nesting_forest() {
        assert!(is_forest(&[None, Some(0), Some(1)]));
        assert!(!is_forest(&[Some(1), Some(0)]));
    }

    #[test]
    fn test_circle_from_two_arcs() {
        let mut g = Geometry::new(CoordinateType::Planar);
        let a = g.add_node(Point::new(-1., 0.)).unwrap();
        let b = g.add_node(Point::new(1., 0.)).unwrap();
        g.add_edge(Edge::new(a, b).with_angle(180.)).unwrap();
        g.add_edge(Edge::new(b, a).with_angle(180.)).unwrap();
        g.add_label(Label::new(Point::new(0., 0.5), "copper")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
        assert_eq!(res.subdomains.len(), 1);
        assert_eq!(res.subdomains[0].marker.marker(), Some("copper"));
        assert!((res.subdomains[0].area - std::f64::consts::PI).abs() < 1e-2);
    }

    #[test]
    fn test_label_between_arc_and_chord() {
        // Half disk: straight diameter and an arc over it
        let mut g = Geometry::new(CoordinateType::Planar);
        let a = g.add_node(Point::new(-1., 0.)).unwrap();
        let b = g.add_node(Point::new(1., 0.)).unwrap();
        g.add_edge(Edge::new(a, b)).unwrap();
        g.add_edge(Edge::new(b, a).with_angle(180.)).unwrap();
        g.add_label(Label::new(Point::new(0., 0.95), "air")).unwrap();

        let opts = ResolveOptions::default();
        let res = resolve(&g, &opts);
        assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
        assert_eq!(res.subdomains.len(), 1);
        assert!((res.subdomains[0].area - std::f64::consts::FRAC_PI_2).abs() < 1e-2);
        assert!(res.subdomains_at(&g, Point::new(0., -0.5), &opts).unwrap().is_empty());
    }

    #[test]
    fn test_arc_through_edge_is_crossing() {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_polygon(&mut g, &square(0., 0., 2.));
        // Half disk hanging below y = 1, inside the square
        let a = g.add_node(Point::new(0.5, 1.)).unwrap();
        let b = g.add_node(Point::new(1.5, 1.)).unwrap();
        g.add_edge(Edge::new(a, b).with_angle(180.)).unwrap();
        g.add_edge(Edge::new(b, a)).unwrap();
        g.add_label(Label::new(Point::new(1.8, 1.8), "air")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        assert!(
            !res.diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::EdgeCrossing { .. }))
        );

        let c = g.add_node(Point::new(0.5, 0.2)).unwrap();
        let d = g.add_node(Point::new(1.5, 0.2)).unwrap();
        g.add_edge(Edge::new(c, d).with_angle(180.)).unwrap();
        g.add_edge(Edge::new(d, c)).unwrap();
        let res = resolve(&g, &ResolveOptions::default());
        // Same shape dropped to y = 0.2 pokes through the bottom edge
        assert!(
            res.diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::EdgeCrossing { .. }))
        );
    }
}
