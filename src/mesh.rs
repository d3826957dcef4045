//! Finite element mesh as seen by the solver layer.
//!
//! The actual triangulation lives with the mesh generation backend. Here a
//! mesh is the list of elements the adaptivity loop reasons about: which
//! subdomain each element belongs to, its area, polynomial order and
//! refinement level. That is all that is needed to count degrees of freedom,
//! select elements for refinement and build reference meshes.

pub mod cache;
pub mod generator;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::UID;
use crate::geom::model::MAX_POLYNOMIAL_ORDER;

/// Number of children produced by splitting a triangle at its edge midpoints.
pub const H_SPLIT_CHILDREN: usize = 4;

/// Interchangeable mesh generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshBackend {
    #[default]
    Triangle,
    Gmsh,
}

/// Kind of refinement applied to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Refinement {
    /// Split into smaller elements.
    H,
    /// Raise polynomial order.
    P,
    /// Both.
    Hp,
}

impl Refinement {
    pub fn splits(self) -> bool {
        matches!(self, Self::H | Self::Hp)
    }

    pub fn raises_order(self) -> bool {
        matches!(self, Self::P | Self::Hp)
    }
}

/// Number of Lagrange degrees of freedom of a triangle of order `p`.
pub fn local_dofs(order: u8) -> usize {
    let p = order as usize;
    (p + 1) * (p + 2) / 2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Material marker of the subdomain the element belongs to.
    pub marker: String,
    pub area: f64,
    /// Polynomial order (1..=10).
    pub order: u8,
    /// Number of h-refinements since the initial mesh.
    pub level: u8,
}

impl Element {
    pub fn new(marker: &str, area: f64, order: u8) -> Self {
        Self {
            marker: marker.to_string(),
            area,
            order: order.clamp(1, MAX_POLYNOMIAL_ORDER),
            level: 0,
        }
    }

    pub fn local_dofs(&self) -> usize {
        local_dofs(self.order)
    }

    /// Whether `refinement` would change this element.
    pub fn can_refine(&self, refinement: Refinement) -> bool {
        refinement.splits() || self.order < MAX_POLYNOMIAL_ORDER
    }

    fn refined(&self, refinement: Refinement) -> Vec<Element> {
        let order = if refinement.raises_order() {
            (self.order + 1).min(MAX_POLYNOMIAL_ORDER)
        } else {
            self.order
        };
        if refinement.splits() {
            let child = Element {
                marker: self.marker.clone(),
                area: self.area / H_SPLIT_CHILDREN as f64,
                order,
                level: self.level.saturating_add(1),
            };
            vec![child; H_SPLIT_CHILDREN]
        } else {
            vec![Element {
                order,
                ..self.clone()
            }]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub uid: UID,
    pub backend: MeshBackend,
    pub elements: Vec<Element>,
}

impl Mesh {
    pub fn new(backend: MeshBackend, elements: Vec<Element>) -> Self {
        Self {
            uid: UID::new(),
            backend,
            elements,
        }
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Total number of degrees of freedom (sum of local element DOFs).
    pub fn dof_count(&self) -> usize {
        self.elements.iter().map(Element::local_dofs).sum()
    }

    pub fn total_area(&self) -> f64 {
        self.elements.iter().map(|e| e.area).sum()
    }

    /// Distinct material markers present in the mesh.
    pub fn markers(&self) -> BTreeSet<&str> {
        self.elements.iter().map(|e| e.marker.as_str()).collect()
    }

    /// Returns a new mesh with the given elements refined.
    ///
    /// `plan` holds `(element index, refinement)` pairs; indices out of range
    /// are ignored and a later entry for the same element overrides an earlier
    /// one. Children replace their parent in place, so element order is
    /// preserved.
    pub fn refine(&self, plan: &[(usize, Refinement)]) -> Mesh {
        let mut chosen: Vec<Option<Refinement>> = vec![None; self.elements.len()];
        for &(id, r) in plan {
            if let Some(slot) = chosen.get_mut(id) {
                *slot = Some(r);
            }
        }
        let elements = self
            .elements
            .iter()
            .zip(chosen)
            .flat_map(|(e, r)| match r {
                Some(r) => e.refined(r),
                None => vec![e.clone()],
            })
            .collect();
        Mesh::new(self.backend, elements)
    }

    /// Splits each listed element into four children of a quarter area.
    pub fn refine_h(&self, element_ids: &[usize]) -> Mesh {
        let plan: Vec<_> = element_ids.iter().map(|&i| (i, Refinement::H)).collect();
        self.refine(&plan)
    }

    /// Raises the polynomial order of each listed element by one.
    pub fn refine_p(&self, element_ids: &[usize]) -> Mesh {
        let plan: Vec<_> = element_ids.iter().map(|&i| (i, Refinement::P)).collect();
        self.refine(&plan)
    }

    /// Reference mesh: every element refined with `refinement`.
    pub fn uniformly_refined(&self, refinement: Refinement) -> Mesh {
        let plan: Vec<_> = (0..self.elements.len()).map(|i| (i, refinement)).collect();
        self.refine(&plan)
    }

    /// For every element of `refined`, the index of the element of `self` it
    /// came from. Works for meshes produced by [`Mesh::refine`] from `self`.
    pub fn parent_map(&self, refined: &Mesh) -> Vec<usize> {
        let mut map = Vec::with_capacity(refined.elements.len());
        let mut child = 0;
        for (i, parent) in self.elements.iter().enumerate() {
            let split = refined
                .elements
                .get(child)
                .is_some_and(|c| c.level > parent.level);
            let n = if split { H_SPLIT_CHILDREN } else { 1 };
            for _ in 0..n {
                map.push(i);
            }
            child += n;
        }
        map.truncate(refined.elements.len());
        map
    }
}
