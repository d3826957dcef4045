//! Time discretization: BDF coefficients and step size control.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::vecutils::relative_change_percent;

/// Highest supported BDF order.
pub const MAX_BDF_ORDER: usize = 3;
/// Bounds of the step size change per adaptive step.
const MIN_STEP_FACTOR: f64 = 0.5;
const MAX_STEP_FACTOR: f64 = 2.0;
const STEP_SAFETY: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeStepMethod {
    #[default]
    Fixed,
    /// Step size driven by the error tolerance; steps above it are redone.
    Adaptive,
    /// Step size follows the error but stays near `total_time / steps`.
    /// Steps are never redone.
    #[serde(rename = "adaptive_numsteps")]
    AdaptiveNumSteps,
}

impl TimeStepMethod {
    pub fn is_adaptive(self) -> bool {
        self != Self::Fixed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSettings {
    pub total_time: f64,
    /// Constant step, or initial step of the adaptive method.
    pub time_step: f64,
    pub method: TimeStepMethod,
    /// Accepted time discretization error per step (%).
    pub tolerance: f64,
    /// BDF order (1..=3).
    pub order: usize,
    /// The adaptive method never goes below this step.
    pub min_time_step: f64,
    /// Approximate number of steps aimed at by `adaptive_numsteps`. Derived
    /// from `time_step` when unset.
    pub steps: Option<usize>,
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            total_time: 1.0,
            time_step: 0.1,
            method: TimeStepMethod::Fixed,
            tolerance: 0.05,
            order: 1,
            min_time_step: 1e-6,
            steps: None,
        }
    }
}

impl TimeSettings {
    pub fn fixed(total_time: f64, time_step: f64) -> Self {
        Self {
            total_time,
            time_step,
            ..Self::default()
        }
    }

    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if !(self.total_time > 0.0) {
            return Err(ConfigError::InvalidTotalTime {
                field: field.to_string(),
                total_time: self.total_time,
            });
        }
        if !(self.time_step > 0.0) {
            return Err(ConfigError::InvalidTimeStep {
                field: field.to_string(),
                time_step: self.time_step,
            });
        }
        if !(self.tolerance > 0.0) {
            return Err(ConfigError::InvalidTimeTolerance {
                field: field.to_string(),
                tolerance: self.tolerance,
            });
        }
        if self.steps == Some(0) {
            return Err(crate::config::out_of_range("steps", "must be at least 1"));
        }
        if !(1..=MAX_BDF_ORDER).contains(&self.order) {
            return Err(crate::config::out_of_range(
                "order",
                format!("BDF order must be in 1..={MAX_BDF_ORDER}, got {}", self.order),
            ));
        }
        Ok(())
    }

    /// Step aimed at by `adaptive_numsteps`.
    pub fn target_step(&self) -> f64 {
        match self.steps {
            Some(n) if n > 0 => self.total_time / n as f64,
            _ => self.time_step,
        }
    }
}

/// Backward differentiation formula for a constant step:
/// `sum_i alpha[i] * u_{n+1-i} = dt * f(u_{n+1})`.
#[derive(Debug, Clone, PartialEq)]
pub struct BdfCoefficients {
    pub order: usize,
    pub alpha: Vec<f64>,
}

pub fn bdf_coefficients(order: usize) -> BdfCoefficients {
    let order = order.clamp(1, MAX_BDF_ORDER);
    let alpha = match order {
        1 => vec![1.0, -1.0],
        2 => vec![1.5, -2.0, 0.5],
        _ => vec![11.0 / 6.0, -3.0, 1.5, -1.0 / 3.0],
    };
    BdfCoefficients { order, alpha }
}

/// Order usable with `available` previous time levels (startup ramp).
pub fn startup_order(requested: usize, available: usize) -> usize {
    requested.min(available).clamp(1, MAX_BDF_ORDER)
}

/// Explicit extrapolation to `time` from previous `(time, values)` levels,
/// most recent first.
///
/// With one level this is the last value (zero order). With two or more it
/// is the linear extrapolation through the two most recent levels, which
/// accounts for unequal steps.
pub fn extrapolate(history: &[(f64, &[f64])], time: f64) -> Vec<f64> {
    match history {
        [] => Vec::new(),
        [(_, last)] => last.to_vec(),
        [(t1, last), (t0, before), ..] => {
            if !(t1 - t0).is_normal() {
                return last.to_vec();
            }
            let ratio = (time - t1) / (t1 - t0);
            last.iter()
                .zip(before.iter())
                .map(|(a, b)| a + ratio * (a - b))
                .collect()
        }
    }
}

/// Time discretization error estimate (%) between the extrapolated predictor
/// and the implicit solution.
pub fn time_error_percent(predictor: &[f64], corrector: &[f64]) -> f64 {
    relative_change_percent(corrector, predictor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    Accept,
    Reject,
}

/// Simulation clock.
#[derive(Debug, Clone)]
pub struct TimeStepper {
    settings: TimeSettings,
    time: f64,
    step: f64,
    index: usize,
    /// Sum and count of the errors seen by `adaptive_numsteps`.
    error_sum: f64,
    error_count: usize,
}

impl TimeStepper {
    pub fn new(settings: TimeSettings) -> Self {
        let step = match settings.method {
            TimeStepMethod::AdaptiveNumSteps => settings.target_step(),
            _ => settings.time_step,
        };
        Self {
            settings,
            time: 0.0,
            step,
            index: 0,
            error_sum: 0.0,
            error_count: 0,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of accepted steps.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() <= self.settings.total_time * 1e-9
    }

    fn remaining(&self) -> f64 {
        self.settings.total_time - self.time
    }

    /// Step to attempt next (never past the end time).
    pub fn next_step(&self) -> f64 {
        self.step.min(self.remaining())
    }

    pub fn accept(&mut self, step: f64) {
        self.time += step;
        self.index += 1;
        // Snap to the end to avoid a sliver step from rounding
        if self.is_finished() {
            self.time = self.settings.total_time;
        }
    }

    fn step_factor(&self, tolerance: f64, error_percent: f64) -> f64 {
        let exponent = 1.0 / (self.settings.order as f64 + 1.0);
        if error_percent > 0.0 {
            (STEP_SAFETY * (tolerance / error_percent).powf(exponent))
                .clamp(MIN_STEP_FACTOR, MAX_STEP_FACTOR)
        } else {
            MAX_STEP_FACTOR
        }
    }

    /// Updates the step size from the error of the last attempt.
    ///
    /// Fixed stepping always accepts. The adaptive method rejects a step
    /// above tolerance unless it is already at the minimum step.
    /// `adaptive_numsteps` always accepts: it steers towards the running mean
    /// error and keeps the step within a factor of two of the target step.
    pub fn adapt(&mut self, error_percent: f64) -> StepDecision {
        match self.settings.method {
            TimeStepMethod::Fixed => StepDecision::Accept,
            TimeStepMethod::Adaptive => {
                let tol = self.settings.tolerance;
                let factor = self.step_factor(tol, error_percent);
                let at_minimum = self.step <= self.settings.min_time_step;
                self.step = (self.step * factor).max(self.settings.min_time_step);
                if error_percent > tol && !at_minimum {
                    debug!(error_percent, step = self.step, "Time step rejected");
                    StepDecision::Reject
                } else {
                    StepDecision::Accept
                }
            }
            TimeStepMethod::AdaptiveNumSteps => {
                self.error_sum += error_percent;
                self.error_count += 1;
                let mean = self.error_sum / self.error_count as f64;
                let target = self.settings.target_step();
                let factor = self.step_factor(mean, error_percent);
                self.step = (self.step * factor)
                    .clamp(MIN_STEP_FACTOR * target, MAX_STEP_FACTOR * target)
                    .max(self.settings.min_time_step);
                StepDecision::Accept
            }
        }
    }
}
