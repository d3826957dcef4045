//! Boundary to the external assembly and linear solve.
//!
//! The finite element assembly, the sparse solver and the error estimator
//! live outside this crate. They are reached through the [`Assembler`]
//! trait, so the orchestration logic can be driven by any implementation,
//! including small synthetic ones in tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, out_of_range};
use crate::mesh::Mesh;
use crate::sim::adaptivity::ErrorNorm;
use crate::sim::field::{AnalysisType, FieldId};
use crate::sim::nonlinear::LinearityType;
use crate::sim::store::Solution;
use crate::sim::transient::BdfCoefficients;

/// Physics definition of a field, consumed as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakForms {
    /// Identifier of the physics module.
    pub id: String,
    /// Number of solution components.
    pub components: usize,
    /// True when the forms do not depend on the solution.
    pub linear: bool,
    /// Named material or source parameters.
    pub parameters: BTreeMap<String, f64>,
}

impl WeakForms {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            components: 1,
            linear: true,
            parameters: BTreeMap::new(),
        }
    }

    pub fn nonlinear(mut self) -> Self {
        self.linear = false;
        self
    }

    pub fn with_parameter(mut self, name: &str, value: f64) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.components == 0 {
            return Err(out_of_range("components", "a field needs at least one component"));
        }
        Ok(())
    }
}

/// Failures reported by the assembly/solve collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("singular system")]
    SingularSystem,
    /// Any other failure of the collaborator, carried as a value.
    #[error("external solver failure: {0}")]
    External(String),
}

/// Solution of another field fed into this one.
#[derive(Debug, Clone)]
pub struct CoupledInput {
    pub source: FieldId,
    pub solution: Arc<Solution>,
}

/// Everything the collaborator needs besides the mesh and the forms.
#[derive(Debug, Clone, Copy)]
pub struct SolveContext<'a> {
    pub field: FieldId,
    pub analysis: AnalysisType,
    pub linearity: LinearityType,
    /// Current iterate on the mesh being solved (initial guess on the first
    /// nonlinear iteration).
    pub previous: &'a [f64],
    pub time: f64,
    /// Time step of a transient field.
    pub time_step: Option<f64>,
    pub bdf: Option<&'a BdfCoefficients>,
    /// Accepted solutions of earlier time steps, most recent first.
    pub history: &'a [Arc<Solution>],
    pub coupled: &'a [CoupledInput],
    pub frequency: f64,
}

impl<'a> SolveContext<'a> {
    /// Context of a steady solve without couplings.
    pub fn steady(field: FieldId) -> Self {
        Self {
            field,
            analysis: AnalysisType::SteadyState,
            linearity: LinearityType::Linear,
            previous: &[],
            time: 0.0,
            time_step: None,
            bdf: None,
            history: &[],
            coupled: &[],
            frequency: 0.0,
        }
    }

    pub fn with_previous(self, previous: &'a [f64]) -> Self {
        Self { previous, ..self }
    }
}

/// Per-element error of a coarse solution against a reference solution.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementErrors {
    /// Absolute error per coarse element.
    pub per_element: Vec<f64>,
    /// Norm of the reference solution.
    pub reference_norm: f64,
}

impl ElementErrors {
    pub fn total(&self) -> f64 {
        self.per_element.iter().map(|e| e * e).sum::<f64>().sqrt()
    }

    /// Total error relative to the reference solution (%).
    pub fn percent(&self) -> f64 {
        let total = self.total();
        if self.reference_norm > 0.0 {
            100.0 * total / self.reference_norm
        } else if total == 0.0 {
            0.0
        } else {
            100.0
        }
    }
}

pub trait Assembler: Send + Sync {
    /// Assembles the system on `mesh` and solves it once.
    fn assemble_and_solve(
        &self,
        mesh: &Mesh,
        forms: &WeakForms,
        ctx: &SolveContext,
    ) -> Result<Vec<f64>, AssemblyError>;

    /// Element-wise error of `coarse` (on `coarse_mesh`) against `reference`
    /// (on `reference_mesh`, a refinement of `coarse_mesh`).
    fn element_errors(
        &self,
        coarse_mesh: &Mesh,
        coarse: &[f64],
        reference_mesh: &Mesh,
        reference: &[f64],
        norm: ErrorNorm,
    ) -> Result<ElementErrors, AssemblyError>;

    /// Transfers coefficients from one mesh to another.
    ///
    /// The default keeps the vector when the DOF counts match and otherwise
    /// fills the target with the mean value of the source.
    fn project(&self, from: &Mesh, coefficients: &[f64], to: &Mesh) -> Vec<f64> {
        let n = to.dof_count();
        if from.uid == to.uid || coefficients.len() == n {
            return coefficients.to_vec();
        }
        let mean = if coefficients.is_empty() {
            0.0
        } else {
            coefficients.iter().sum::<f64>() / coefficients.len() as f64
        };
        vec![mean; n]
    }
}
