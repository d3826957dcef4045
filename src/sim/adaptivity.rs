//! Space adaptivity: solve, estimate, refine, repeat.
//!
//! Each step solves on the current mesh and on a uniformly refined reference
//! mesh (two independent tasks joined before ranking), compares the two to
//! get element errors, and refines the elements picked by the selection
//! policy. A refined candidate is accepted only if its error is strictly
//! lower than the previous step's.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, out_of_range};
use crate::geom::model::MAX_POLYNOMIAL_ORDER;
use crate::mesh::{Element, H_SPLIT_CHILDREN, Mesh, Refinement, local_dofs};
use crate::sim::assembly::{Assembler, AssemblyError, SolveContext, WeakForms};
use crate::sim::nonlinear::{NonlinearFailure, NonlinearSettings, solve_nonlinear};
use crate::vecutils::max;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptivityStrategy {
    #[default]
    Disabled,
    H,
    P,
    Hp,
}

impl AdaptivityStrategy {
    fn refinement(self) -> Option<Refinement> {
        match self {
            Self::Disabled => None,
            Self::H => Some(Refinement::H),
            Self::P => Some(Refinement::P),
            Self::Hp => Some(Refinement::Hp),
        }
    }
}

/// Norm used by the error estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorNorm {
    #[default]
    H1,
    L2,
    H1Seminorm,
    Hdiv,
    Hcurl,
}

/// Which elements to refine given their errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Largest errors first until they hold `threshold` of the squared total
    /// (√threshold of the total error); ties at the cut are all included.
    #[default]
    GuaranteedRank,
    /// Every element above `threshold * max error`.
    FixedFraction,
    /// Every element above `threshold`.
    AbsoluteThreshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptivityPolicy {
    pub strategy: AdaptivityStrategy,
    /// Stop when the estimated error drops to this value (%).
    pub tolerance_percent: f64,
    pub max_steps: usize,
    pub max_dofs: usize,
    pub norm: ErrorNorm,
    pub selection: SelectionPolicy,
    pub threshold: f64,
    /// Assumed exponential convergence rate of p-refinement, weighs h against
    /// p candidates in hp mode.
    pub convergence_exponent: f64,
    /// Build the reference mesh with hp refinement regardless of strategy.
    pub finer_reference: bool,
    /// Transient runs restart adaptivity from the mesh accepted this many
    /// time steps earlier (0 = initial mesh).
    pub transient_back_steps: usize,
    /// Transient runs redo adaptivity every this many time steps and reuse
    /// the last mesh in between.
    pub transient_redone_each: usize,
}

impl Default for AdaptivityPolicy {
    fn default() -> Self {
        Self {
            strategy: AdaptivityStrategy::Disabled,
            tolerance_percent: 1.0,
            max_steps: 10,
            max_dofs: 60_000,
            norm: ErrorNorm::H1,
            selection: SelectionPolicy::GuaranteedRank,
            threshold: 0.3,
            convergence_exponent: 1.0,
            finer_reference: false,
            transient_back_steps: 3,
            transient_redone_each: 5,
        }
    }
}

impl AdaptivityPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.strategy != AdaptivityStrategy::Disabled
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if !(self.tolerance_percent > 0.0) {
            return Err(out_of_range(
                "tolerance_percent",
                format!("adaptivity tolerance must be > 0, got {}", self.tolerance_percent),
            ));
        }
        if self.max_steps == 0 {
            return Err(out_of_range("max_steps", "adaptivity needs at least one step"));
        }
        let threshold_ok = match self.selection {
            SelectionPolicy::GuaranteedRank | SelectionPolicy::FixedFraction => {
                self.threshold > 0.0 && self.threshold <= 1.0
            }
            SelectionPolicy::AbsoluteThreshold => self.threshold >= 0.0,
        };
        if !threshold_ok {
            return Err(out_of_range(
                "threshold",
                format!("{} is not valid for {:?}", self.threshold, self.selection),
            ));
        }
        if !(self.convergence_exponent > 0.0) {
            return Err(out_of_range(
                "convergence_exponent",
                format!("must be > 0, got {}", self.convergence_exponent),
            ));
        }
        if self.transient_redone_each == 0 {
            return Err(out_of_range("transient_redone_each", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdaptivityError {
    #[error("adaptivity step {step}: {source}")]
    Nonlinear {
        step: usize,
        #[source]
        source: NonlinearFailure,
    },
    #[error("adaptivity step {step}: error estimate failed: {source}")]
    Estimator {
        step: usize,
        #[source]
        source: AssemblyError,
    },
}

impl AdaptivityError {
    /// True when the failure comes from the external collaborator itself.
    pub fn is_external(&self) -> bool {
        match self {
            Self::Nonlinear { source, .. } => source.is_external(),
            Self::Estimator { source, .. } => matches!(source, AssemblyError::External(_)),
        }
    }
}

/// One accepted (mesh, solution, error) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveStep {
    pub index: usize,
    pub mesh: Arc<Mesh>,
    pub solution: Vec<f64>,
    /// `None` when adaptivity is disabled.
    pub error_percent: Option<f64>,
    pub dofs: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Disabled,
    ToleranceReached,
    MaxDofs,
    MaxSteps,
    NothingToRefine,
    NoImprovement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptivityRun {
    pub steps: Vec<AdaptiveStep>,
    pub stop: StopReason,
}

impl AdaptivityRun {
    /// Last accepted step (the run always holds at least one).
    pub fn last(&self) -> Option<&AdaptiveStep> {
        self.steps.last()
    }
}

/// Indices of the elements to refine, in ascending order.
pub fn select_elements(errors: &[f64], selection: SelectionPolicy, threshold: f64) -> Vec<usize> {
    let largest = max(errors).unwrap_or(0.0);
    if largest <= 0.0 {
        return Vec::new();
    }
    let mut selected: Vec<usize> = match selection {
        SelectionPolicy::FixedFraction => (0..errors.len())
            .filter(|&i| errors[i] > threshold * largest)
            .collect(),
        SelectionPolicy::AbsoluteThreshold => {
            (0..errors.len()).filter(|&i| errors[i] > threshold).collect()
        }
        SelectionPolicy::GuaranteedRank => {
            let mut order: Vec<usize> = (0..errors.len()).collect();
            order.sort_by(|&a, &b| errors[b].total_cmp(&errors[a]).then(a.cmp(&b)));
            let total: f64 = errors.iter().map(|e| e * e).sum();
            let target = threshold * total;
            let mut covered = 0.0;
            let mut out = Vec::new();
            let mut cut = f64::INFINITY;
            for &i in &order {
                let e = errors[i];
                // Ties with the last selected element stay in
                if covered >= target && e < cut {
                    break;
                }
                covered += e * e;
                cut = e;
                out.push(i);
            }
            out
        }
    };
    selected.sort_unstable();
    selected
}

/// Picks h, p or hp refinement for one element by the best predicted error
/// reduction per added degree of freedom.
pub fn choose_refinement(element: &Element, error: f64, convergence_exponent: f64) -> Refinement {
    let p = element.order;
    let dofs = local_dofs(p) as f64;
    let p_gain = (-convergence_exponent).exp();
    let h_gain = 0.5f64.powi(p as i32);

    let mut best = (Refinement::H, error * (1.0 - h_gain) / ((H_SPLIT_CHILDREN as f64 - 1.0) * dofs));
    if p < MAX_POLYNOMIAL_ORDER {
        let p_cost = local_dofs(p + 1) as f64 - dofs;
        let p_score = error * (1.0 - p_gain) / p_cost;
        if p_score > best.1 {
            best = (Refinement::P, p_score);
        }
        let hp_cost = H_SPLIT_CHILDREN as f64 * local_dofs(p + 1) as f64 - dofs;
        let hp_score = error * (1.0 - 0.5f64.powi(p as i32 + 1) * p_gain) / hp_cost;
        if hp_score > best.1 {
            best = (Refinement::Hp, hp_score);
        }
    }
    best.0
}

/// Refinement plan for the selected elements under `strategy`.
fn plan_refinement(
    mesh: &Mesh,
    selected: &[usize],
    errors: &[f64],
    policy: &AdaptivityPolicy,
) -> Vec<(usize, Refinement)> {
    let Some(refinement) = policy.strategy.refinement() else {
        return Vec::new();
    };
    selected
        .iter()
        .filter_map(|&i| {
            let element = &mesh.elements[i];
            let r = match refinement {
                Refinement::Hp => choose_refinement(element, errors[i], policy.convergence_exponent),
                r => r,
            };
            element.can_refine(r).then_some((i, r))
        })
        .collect()
}

/// Runs the adaptivity loop for one field.
///
/// `initial` is the starting guess and the mesh it lives on; it is projected
/// onto every mesh the loop visits.
pub fn run_adaptivity(
    assembler: &dyn Assembler,
    initial_mesh: Arc<Mesh>,
    forms: &WeakForms,
    nonlinear: &NonlinearSettings,
    policy: &AdaptivityPolicy,
    ctx: &SolveContext,
    initial: Option<(&Mesh, &[f64])>,
) -> Result<AdaptivityRun, AdaptivityError> {
    let mut mesh = initial_mesh;
    let mut guess = match initial {
        Some((from, coefficients)) => assembler.project(from, coefficients, &mesh),
        None => vec![0.0; mesh.dof_count()],
    };

    let Some(refinement) = policy.strategy.refinement() else {
        let outcome = solve_nonlinear(assembler, &mesh, forms, nonlinear, ctx, &guess)
            .map_err(|source| AdaptivityError::Nonlinear { step: 0, source })?;
        return Ok(AdaptivityRun {
            steps: vec![AdaptiveStep {
                index: 0,
                dofs: mesh.dof_count(),
                mesh,
                solution: outcome.solution,
                error_percent: None,
                iterations: outcome.iterations,
            }],
            stop: StopReason::Disabled,
        });
    };
    let reference_refinement = if policy.finer_reference {
        Refinement::Hp
    } else {
        refinement
    };

    let mut steps: Vec<AdaptiveStep> = Vec::new();
    let mut stop = StopReason::MaxSteps;
    for index in 0..policy.max_steps {
        let reference_mesh = mesh.uniformly_refined(reference_refinement);
        let reference_guess = assembler.project(&mesh, &guess, &reference_mesh);

        let (coarse, reference) = rayon::join(
            || solve_nonlinear(assembler, &mesh, forms, nonlinear, ctx, &guess),
            || solve_nonlinear(assembler, &reference_mesh, forms, nonlinear, ctx, &reference_guess),
        );
        let coarse = coarse.map_err(|source| AdaptivityError::Nonlinear { step: index, source })?;
        let reference =
            reference.map_err(|source| AdaptivityError::Nonlinear { step: index, source })?;

        let errors = assembler
            .element_errors(
                &mesh,
                &coarse.solution,
                &reference_mesh,
                &reference.solution,
                policy.norm,
            )
            .map_err(|source| AdaptivityError::Estimator { step: index, source })?;
        let error = errors.percent();
        let dofs = mesh.dof_count();

        if let Some(previous) = steps.last()
            && let Some(previous_error) = previous.error_percent
            && !(error < previous_error)
        {
            info!(
                step = index,
                error_percent = error,
                previous_error_percent = previous_error,
                "Refined mesh does not reduce the error, candidate rejected"
            );
            stop = StopReason::NoImprovement;
            break;
        }

        debug!(step = index, dofs, error_percent = error, "Adaptivity step");
        steps.push(AdaptiveStep {
            index,
            mesh: mesh.clone(),
            solution: coarse.solution,
            error_percent: Some(error),
            dofs,
            iterations: coarse.iterations,
        });

        if error <= policy.tolerance_percent {
            stop = StopReason::ToleranceReached;
            break;
        }
        if dofs >= policy.max_dofs {
            stop = StopReason::MaxDofs;
            break;
        }
        if index + 1 >= policy.max_steps {
            stop = StopReason::MaxSteps;
            break;
        }

        let selected = select_elements(&errors.per_element, policy.selection, policy.threshold);
        let plan = plan_refinement(&mesh, &selected, &errors.per_element, policy);
        if plan.is_empty() {
            stop = StopReason::NothingToRefine;
            break;
        }
        let refined = Arc::new(mesh.refine(&plan));
        if let Some(last) = steps.last() {
            guess = assembler.project(&mesh, &last.solution, &refined);
        }
        mesh = refined;
    }

    info!(
        steps = steps.len(),
        stop = ?stop,
        error_percent = steps.last().and_then(|s| s.error_percent),
        "Adaptivity finished"
    );
    Ok(AdaptivityRun { steps, stop })
}
