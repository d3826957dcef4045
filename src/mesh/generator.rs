//! Boundary to the external mesh generators.
//!
//! A generator receives a [`GeometryDescriptor`] (the resolved subdomains as
//! plain polygons plus edge markers) and returns a [`Mesh`]. Both backends
//! share the same contract; the pre-checks in [`generate_mesh`] run before
//! any backend is called.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::geom::loops::{Resolution, SubdomainMarker};
use crate::geom::model::{CoordinateType, Geometry};
use crate::geom::point::Point;
use crate::mesh::{Element, Mesh, MeshBackend};

/// Fewest nodes or edges a meshable geometry can have.
pub const MIN_NODES: usize = 3;
pub const MIN_EDGES: usize = 3;
/// Upper bound on elements per subdomain produced by [`CoarseGenerator`].
const MAX_COARSE_ELEMENTS: usize = 100_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("geometry has {0} nodes, at least {MIN_NODES} are needed")]
    NotEnoughNodes(usize),
    #[error("geometry has {0} edges, at least {MIN_EDGES} are needed")]
    NotEnoughEdges(usize),
    #[error("subdomain {0} has no unique material marker")]
    UnmarkedSubdomain(usize),
    #[error("geometry topology has {0} fatal diagnostics")]
    InvalidTopology(usize),
    #[error("mesh backend {0:?} is not available")]
    BackendUnavailable(MeshBackend),
    #[error("mesh backend {backend:?} failed: {message}")]
    Backend {
        backend: MeshBackend,
        message: String,
    },
}

/// One subdomain to be meshed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubdomainDescriptor {
    pub marker: String,
    /// Counter-clockwise outer polygon.
    pub outer: Vec<Point>,
    /// Hole polygons (clockwise).
    pub holes: Vec<Vec<Point>>,
    /// Net area (outer minus holes).
    pub area: f64,
    pub area_hint: Option<f64>,
    pub order_hint: Option<u8>,
}

/// One drawn edge with its mesh-relevant attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDescriptor {
    pub start: Point,
    pub end: Point,
    /// Curvature angle in degrees.
    pub angle: f64,
    pub boundary: Option<String>,
    pub refinement: Option<u8>,
}

/// Resolved geometry handed to a mesh generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryDescriptor {
    pub coordinate_type: CoordinateType,
    pub subdomains: Vec<SubdomainDescriptor>,
    pub edges: Vec<EdgeDescriptor>,
    pub fingerprint: u64,
}

impl GeometryDescriptor {
    /// Builds the descriptor from a resolved geometry.
    ///
    /// Subdomains marked as holes are left out. Subdomains without a unique
    /// marker are an error.
    pub fn build(geometry: &Geometry, resolution: &Resolution) -> Result<Self, GenerationError> {
        let mut subdomains = Vec::new();
        for (i, sd) in resolution.subdomains.iter().enumerate() {
            let (label, marker) = match &sd.marker {
                SubdomainMarker::Material { label, marker } => (&geometry.labels()[*label], marker),
                SubdomainMarker::Hole { .. } => continue,
                SubdomainMarker::Missing | SubdomainMarker::Ambiguous(_) => {
                    return Err(GenerationError::UnmarkedSubdomain(i));
                }
            };
            subdomains.push(SubdomainDescriptor {
                marker: marker.clone(),
                outer: resolution.loops[sd.outer].points(geometry),
                holes: sd
                    .holes
                    .iter()
                    .map(|&h| resolution.loops[h].points(geometry))
                    .collect(),
                area: sd.area,
                area_hint: label.area_hint,
                order_hint: label.order_hint,
            });
        }

        let nodes = geometry.nodes();
        let edges = geometry
            .edges()
            .iter()
            .map(|e| EdgeDescriptor {
                start: nodes[e.start].point,
                end: nodes[e.end].point,
                angle: e.angle,
                boundary: e.boundary.clone(),
                refinement: e.refinement,
            })
            .collect();

        Ok(Self {
            coordinate_type: geometry.coordinate_type(),
            subdomains,
            edges,
            fingerprint: geometry.fingerprint(),
        })
    }
}

/// A mesh generation backend.
pub trait MeshGenerator: Send + Sync {
    fn backend(&self) -> MeshBackend;
    fn generate(&self, descriptor: &GeometryDescriptor) -> Result<Mesh, GenerationError>;
}

/// Registered mesh generators, one per backend.
#[derive(Clone, Default)]
pub struct MeshGenerators {
    generators: Vec<Arc<dyn MeshGenerator>>,
}

impl MeshGenerators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a generator, replacing any previous one for the same backend.
    pub fn register(&mut self, generator: Arc<dyn MeshGenerator>) {
        self.generators.retain(|g| g.backend() != generator.backend());
        self.generators.push(generator);
    }

    pub fn with(mut self, generator: Arc<dyn MeshGenerator>) -> Self {
        self.register(generator);
        self
    }

    pub fn get(&self, backend: MeshBackend) -> Option<&Arc<dyn MeshGenerator>> {
        self.generators.iter().find(|g| g.backend() == backend)
    }
}

/// Runs the pre-checks and calls the backend.
pub fn generate_mesh(
    generators: &MeshGenerators,
    geometry: &Geometry,
    resolution: &Resolution,
    backend: MeshBackend,
) -> Result<Mesh, GenerationError> {
    let n_nodes = geometry.nodes().len();
    if n_nodes < MIN_NODES {
        return Err(GenerationError::NotEnoughNodes(n_nodes));
    }
    let n_edges = geometry.edges().len();
    if n_edges < MIN_EDGES {
        return Err(GenerationError::NotEnoughEdges(n_edges));
    }
    if let Some(i) = resolution
        .subdomains
        .iter()
        .position(|s| !s.marker.is_resolved())
    {
        return Err(GenerationError::UnmarkedSubdomain(i));
    }
    let fatal = resolution.fatal_diagnostics().count();
    if fatal > 0 {
        return Err(GenerationError::InvalidTopology(fatal));
    }
    let generator = generators
        .get(backend)
        .ok_or(GenerationError::BackendUnavailable(backend))?;

    let descriptor = GeometryDescriptor::build(geometry, resolution)?;
    debug!(
        ?backend,
        subdomains = descriptor.subdomains.len(),
        "Calling mesh generator"
    );
    let mesh = generator.generate(&descriptor)?;
    info!(
        ?backend,
        mesh = %mesh.uid.short(),
        elements = mesh.element_count(),
        dofs = mesh.dof_count(),
        "Mesh generated"
    );
    Ok(mesh)
}

/// Built-in reference backend.
///
/// Produces a coarse element list per subdomain: the subdomain area is split
/// into `ceil(area / area_hint)` equal elements (one element without a hint),
/// each with the label's polynomial order (1 without a hint).
#[derive(Debug, Clone, Copy)]
pub struct CoarseGenerator {
    backend: MeshBackend,
}

impl CoarseGenerator {
    pub fn new(backend: MeshBackend) -> Self {
        Self { backend }
    }
}

impl Default for CoarseGenerator {
    fn default() -> Self {
        Self::new(MeshBackend::Triangle)
    }
}

impl MeshGenerator for CoarseGenerator {
    fn backend(&self) -> MeshBackend {
        self.backend
    }

    fn generate(&self, descriptor: &GeometryDescriptor) -> Result<Mesh, GenerationError> {
        let mut elements = Vec::new();
        for sd in &descriptor.subdomains {
            if !(sd.area > 0.0) {
                return Err(GenerationError::Backend {
                    backend: self.backend,
                    message: format!("subdomain '{}' has no area", sd.marker),
                });
            }
            let count = match sd.area_hint {
                Some(hint) => ((sd.area / hint).ceil() as usize).clamp(1, MAX_COARSE_ELEMENTS),
                None => 1,
            };
            let order = sd.order_hint.unwrap_or(1);
            let area = sd.area / count as f64;
            elements.extend((0..count).map(|_| Element::new(&sd.marker, area, order)));
        }
        if elements.is_empty() {
            return Err(GenerationError::Backend {
                backend: self.backend,
                message: "nothing to mesh".to_string(),
            });
        }
        Ok(Mesh::new(self.backend, elements))
    }
}
