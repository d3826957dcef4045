//! Nonlinear step solver: Picard or Newton updates with damping and optional
//! Anderson acceleration.
//!
//! Each iteration asks the assembly collaborator for a new proposal based on
//! the current iterate. The relative change between the two drives divergence
//! detection and automatic damping. Convergence is judged on the relative
//! change, on the norm of the fixed-point residual, or on both.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{ConfigError, out_of_range};
use crate::mesh::Mesh;
use crate::sim::assembly::{Assembler, AssemblyError, SolveContext, WeakForms};
use crate::sim::dense::least_squares;
use crate::vecutils::{blend, diff_norm, relative_change_percent, sub};

/// Damping never drops below this factor.
const MIN_DAMPING: f64 = 1e-3;
/// Largest Anderson history window.
pub const MAX_ANDERSON_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinearityType {
    #[default]
    Linear,
    Picard,
    Newton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DampingType {
    Off,
    Fixed,
    #[default]
    Automatic,
}

/// Quantity compared against the tolerances to stop iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceMeasure {
    /// Relative change of the solution below `tolerance_percent`.
    #[default]
    RelativeChange,
    /// Euclidean norm of `proposal - iterate` below `residual_tolerance`.
    ResidualNorm,
    /// Both of the above at once.
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearSettings {
    pub linearity: LinearityType,
    pub convergence: ConvergenceMeasure,
    /// Convergence when the relative change of the solution drops below this (%).
    pub tolerance_percent: f64,
    /// Absolute residual norm accepted as converged.
    pub residual_tolerance: f64,
    pub max_steps: usize,
    pub damping: DampingType,
    /// Initial (automatic) or constant (fixed) damping factor, in (0, 1].
    pub damping_coeff: f64,
    /// Successful steps in a row after which automatic damping is relaxed.
    pub steps_to_increase_damping: usize,
    /// Factor applied to the damping after an unsuccessful step, in (0, 1).
    pub damping_decrease_ratio: f64,
    /// A step counts as diverging when its change exceeds the previous change
    /// times this factor. Two diverging steps in a row abort the solve.
    pub divergence_factor: f64,
    pub anderson_acceleration: bool,
    /// Anderson blend coefficient, in (0, 1).
    pub anderson_beta: f64,
    /// Number of retained update vectors (1..=5).
    pub anderson_window: usize,
}

impl Default for NonlinearSettings {
    fn default() -> Self {
        Self {
            linearity: LinearityType::Linear,
            convergence: ConvergenceMeasure::RelativeChange,
            tolerance_percent: 1e-3,
            residual_tolerance: 1e-6,
            max_steps: 20,
            damping: DampingType::Automatic,
            damping_coeff: 0.8,
            steps_to_increase_damping: 1,
            damping_decrease_ratio: 0.5,
            divergence_factor: 1.0,
            anderson_acceleration: false,
            anderson_beta: 0.2,
            anderson_window: 3,
        }
    }
}

impl NonlinearSettings {
    pub fn picard() -> Self {
        Self {
            linearity: LinearityType::Picard,
            ..Self::default()
        }
    }

    pub fn newton() -> Self {
        Self {
            linearity: LinearityType::Newton,
            ..Self::default()
        }
    }

    fn is_converged(&self, change_percent: f64, residual_norm: f64) -> bool {
        let by_change = change_percent < self.tolerance_percent;
        let by_residual = residual_norm < self.residual_tolerance;
        match self.convergence {
            ConvergenceMeasure::RelativeChange => by_change,
            ConvergenceMeasure::ResidualNorm => by_residual,
            ConvergenceMeasure::Both => by_change && by_residual,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance_percent > 0.0) {
            return Err(out_of_range(
                "tolerance_percent",
                format!("must be > 0, got {}", self.tolerance_percent),
            ));
        }
        if self.convergence != ConvergenceMeasure::RelativeChange && !(self.residual_tolerance > 0.0)
        {
            return Err(out_of_range(
                "residual_tolerance",
                format!("must be > 0, got {}", self.residual_tolerance),
            ));
        }
        if self.max_steps == 0 {
            return Err(out_of_range("max_steps", "must be at least 1"));
        }
        if !(self.damping_coeff > 0.0 && self.damping_coeff <= 1.0) {
            return Err(out_of_range(
                "damping_coeff",
                format!("must be in (0, 1], got {}", self.damping_coeff),
            ));
        }
        if !(1..=5).contains(&self.steps_to_increase_damping) {
            return Err(out_of_range(
                "steps_to_increase_damping",
                format!("must be in 1..=5, got {}", self.steps_to_increase_damping),
            ));
        }
        if !(self.damping_decrease_ratio > 0.0 && self.damping_decrease_ratio < 1.0) {
            return Err(out_of_range(
                "damping_decrease_ratio",
                format!("must be in (0, 1), got {}", self.damping_decrease_ratio),
            ));
        }
        if !(self.divergence_factor >= 1.0) {
            return Err(out_of_range(
                "divergence_factor",
                format!("must be >= 1, got {}", self.divergence_factor),
            ));
        }
        if self.anderson_acceleration {
            if self.linearity == LinearityType::Newton {
                return Err(out_of_range(
                    "anderson_acceleration",
                    "only available for Picard iterations",
                ));
            }
            if !(self.anderson_beta > 0.0 && self.anderson_beta < 1.0) {
                return Err(out_of_range(
                    "anderson_beta",
                    format!("must be in (0, 1), got {}", self.anderson_beta),
                ));
            }
            if !(1..=MAX_ANDERSON_WINDOW).contains(&self.anderson_window) {
                return Err(out_of_range(
                    "anderson_window",
                    format!("must be in 1..={MAX_ANDERSON_WINDOW}, got {}", self.anderson_window),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NonlinearFailure {
    #[error("mesh has zero degrees of freedom")]
    ZeroDof,
    #[error("singular system in iteration {iteration}")]
    SingularSystem { iteration: usize },
    #[error("solution diverges in iteration {iteration} (change {change_percent:.3e} %)")]
    Diverged {
        iteration: usize,
        change_percent: f64,
    },
    #[error("no convergence after {iterations} iterations (change {change_percent:.3e} %)")]
    MaxIterationsExceeded {
        iterations: usize,
        change_percent: f64,
    },
    #[error("external solver failure: {0}")]
    External(String),
}

impl NonlinearFailure {
    fn from_assembly(error: AssemblyError, iteration: usize) -> Self {
        match error {
            AssemblyError::SingularSystem => Self::SingularSystem { iteration },
            AssemblyError::External(msg) => Self::External(msg),
        }
    }

    /// True for failures raised by the external collaborator itself.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearOutcome {
    pub solution: Vec<f64>,
    pub iterations: usize,
    /// Relative change (%) of the last iteration.
    pub final_change_percent: f64,
    /// Norm of the difference between the last proposal and its iterate.
    pub final_residual_norm: f64,
    /// Damping factor in effect at the end.
    pub damping: f64,
}

/// Anderson mixing over the last few iterates.
struct Anderson {
    window: usize,
    beta: f64,
    iterates: VecDeque<Vec<f64>>,
    residuals: VecDeque<Vec<f64>>,
}

impl Anderson {
    fn new(window: usize, beta: f64) -> Self {
        Self {
            window,
            beta,
            iterates: VecDeque::new(),
            residuals: VecDeque::new(),
        }
    }

    /// Next iterate from the current one and the collaborator's proposal.
    fn mix(&mut self, current: &[f64], proposal: &[f64]) -> Vec<f64> {
        let residual = sub(proposal, current);
        self.iterates.push_back(current.to_vec());
        self.residuals.push_back(residual.clone());
        if self.iterates.len() > self.window + 1 {
            self.iterates.pop_front();
            self.residuals.pop_front();
        }

        let relaxed: Vec<f64> = current
            .iter()
            .zip(&residual)
            .map(|(x, f)| x + self.beta * f)
            .collect();
        if self.iterates.len() < 2 {
            return relaxed;
        }

        let m = self.iterates.len() - 1;
        let d_res: Vec<Vec<f64>> = (0..m)
            .map(|i| sub(&self.residuals[i + 1], &self.residuals[i]))
            .collect();
        let d_it: Vec<Vec<f64>> = (0..m)
            .map(|i| sub(&self.iterates[i + 1], &self.iterates[i]))
            .collect();

        match least_squares(&d_res, &residual) {
            Ok(gamma) => {
                let mut next = relaxed;
                for (j, g) in gamma.iter().enumerate() {
                    for (k, v) in next.iter_mut().enumerate() {
                        *v -= g * (d_it[j][k] + self.beta * d_res[j][k]);
                    }
                }
                next
            }
            Err(e) => {
                trace!(error = %e, "Anderson least squares failed, restarting history");
                self.iterates.clear();
                self.residuals.clear();
                relaxed
            }
        }
    }
}

/// Solves one nonlinear problem on a fixed mesh.
///
/// `ctx.previous` is ignored; the iterate is passed to the collaborator
/// through it on every iteration, starting from `initial_guess` (zeros if
/// its size does not match the mesh).
pub fn solve_nonlinear(
    assembler: &dyn Assembler,
    mesh: &Mesh,
    forms: &WeakForms,
    settings: &NonlinearSettings,
    ctx: &SolveContext,
    initial_guess: &[f64],
) -> Result<NonlinearOutcome, NonlinearFailure> {
    let dofs = mesh.dof_count();
    if dofs == 0 {
        return Err(NonlinearFailure::ZeroDof);
    }
    let mut current = if initial_guess.len() == dofs {
        initial_guess.to_vec()
    } else {
        vec![0.0; dofs]
    };

    let linearity = if forms.linear {
        LinearityType::Linear
    } else {
        settings.linearity
    };
    let call = |current: &[f64], iteration: usize| -> Result<Vec<f64>, NonlinearFailure> {
        let ctx = SolveContext {
            linearity,
            ..ctx.with_previous(current)
        };
        let proposal = assembler
            .assemble_and_solve(mesh, forms, &ctx)
            .map_err(|e| NonlinearFailure::from_assembly(e, iteration))?;
        if proposal.len() != dofs {
            return Err(NonlinearFailure::External(format!(
                "solution has {} coefficients, mesh has {dofs} DOFs",
                proposal.len()
            )));
        }
        Ok(proposal)
    };

    // Linear problems need a single undamped solve
    if linearity == LinearityType::Linear {
        let solution = call(&current, 1)?;
        let change = relative_change_percent(&solution, &current);
        let residual = diff_norm(&solution, &current);
        return Ok(NonlinearOutcome {
            solution,
            iterations: 1,
            final_change_percent: change,
            final_residual_norm: residual,
            damping: 1.0,
        });
    }

    let mut damping = match settings.damping {
        DampingType::Off => 1.0,
        DampingType::Fixed | DampingType::Automatic => settings.damping_coeff,
    };
    let mut anderson = (settings.anderson_acceleration && linearity == LinearityType::Picard)
        .then(|| Anderson::new(settings.anderson_window, settings.anderson_beta));
    let mut previous_change: Option<f64> = None;
    let mut diverging_steps = 0;
    let mut successful_steps = 0;
    let mut change = f64::INFINITY;

    for iteration in 1..=settings.max_steps {
        let proposal = call(&current, iteration)?;
        change = relative_change_percent(&proposal, &current);
        let residual = diff_norm(&proposal, &current);
        trace!(iteration, change_percent = change, residual, damping, "Nonlinear iteration");

        if settings.is_converged(change, residual) {
            debug!(
                iterations = iteration,
                change_percent = change,
                residual,
                "Nonlinear solve converged"
            );
            return Ok(NonlinearOutcome {
                solution: proposal,
                iterations: iteration,
                final_change_percent: change,
                final_residual_norm: residual,
                damping,
            });
        }

        let improved = previous_change.is_none_or(|prev| change < prev);
        if previous_change.is_some_and(|prev| change > settings.divergence_factor * prev) {
            diverging_steps += 1;
            if diverging_steps >= 2 {
                return Err(NonlinearFailure::Diverged {
                    iteration,
                    change_percent: change,
                });
            }
        } else {
            diverging_steps = 0;
        }

        if settings.damping == DampingType::Automatic {
            if improved {
                successful_steps += 1;
                if successful_steps >= settings.steps_to_increase_damping {
                    damping = (damping / settings.damping_decrease_ratio).min(1.0);
                    successful_steps = 0;
                }
            } else {
                damping = (damping * settings.damping_decrease_ratio).max(MIN_DAMPING);
                successful_steps = 0;
            }
        }

        current = match anderson.as_mut() {
            Some(a) => a.mix(&current, &proposal),
            None => blend(&current, &proposal, damping),
        };
        previous_change = Some(change);
    }

    Err(NonlinearFailure::MaxIterationsExceeded {
        iterations: settings.max_steps,
        change_percent: change,
    })
}
