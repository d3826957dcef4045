//! Run configuration passed to a [`crate::Problem`] at construction.
//!
//! All settings that were process-wide in desktop solvers (worker count,
//! mesh cache size, tolerances of the topology resolver) live here and are
//! fixed for the lifetime of a problem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::loops::ResolveOptions;
use crate::geom::model::CoordinateType;
use crate::mesh::MeshBackend;

/// Configuration problems detected before any solve is attempted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("cannot parse configuration: {0}")]
    Parse(String),
    #[error("{name} is out of range: {reason}")]
    OutOfRange { name: &'static str, reason: String },
    #[error("no field is defined")]
    NoFields,
    #[error("field {0} does not exist")]
    UnknownField(usize),
    #[error("field {0} cannot be coupled to itself")]
    SelfCoupling(usize),
    #[error("hard couplings form a cycle through fields {0:?}")]
    HardCouplingCycle(Vec<usize>),
    #[error("field '{field}': harmonic analysis needs a frequency > 0, got {frequency}")]
    InvalidFrequency { field: String, frequency: f64 },
    #[error("field '{field}': total time must be > 0, got {total_time}")]
    InvalidTotalTime { field: String, total_time: f64 },
    #[error("field '{field}': time step must be > 0, got {time_step}")]
    InvalidTimeStep { field: String, time_step: f64 },
    #[error("field '{field}': time method tolerance must be > 0, got {tolerance}")]
    InvalidTimeTolerance { field: String, tolerance: f64 },
    #[error("field '{field}': space and time adaptivity cannot be combined")]
    SpaceAndTimeAdaptivity { field: String },
    #[error("transient fields disagree on {0}")]
    InconsistentTimeSettings(&'static str),
}

pub(crate) fn out_of_range(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        reason: reason.into(),
    }
}

/// Immutable configuration of one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemConfig {
    pub coordinate_type: CoordinateType,
    /// Worker threads for parallel solves (0 = one per CPU).
    pub threads: usize,
    /// Number of meshes kept by the mesh cache (0 disables caching).
    pub mesh_cache_slots: usize,
    pub mesh_backend: MeshBackend,
    /// Tolerance for coincident positions, on-edge tests and the angular
    /// ordering of edges around a node during face tracing.
    pub geometry_epsilon: f64,
    /// Extra rays cast by the parity test before a containment test is
    /// reported as ambiguous.
    pub parity_retries: usize,
    /// Cap on weak coupling passes per step.
    pub max_coupling_passes: usize,
    /// Coupled passes stop once the largest relative change between two
    /// passes drops below this value (%).
    pub coupling_tolerance_percent: f64,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            coordinate_type: CoordinateType::Planar,
            threads: 0,
            mesh_cache_slots: 8,
            mesh_backend: MeshBackend::Triangle,
            geometry_epsilon: 1e-9,
            parity_retries: 5,
            max_coupling_passes: 10,
            coupling_tolerance_percent: 1e-3,
        }
    }
}

impl ProblemConfig {
    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.geometry_epsilon > 0.0 && self.geometry_epsilon.is_finite()) {
            return Err(out_of_range(
                "geometry_epsilon",
                format!("must be a positive number, got {}", self.geometry_epsilon),
            ));
        }
        if self.max_coupling_passes == 0 {
            return Err(out_of_range("max_coupling_passes", "must be at least 1"));
        }
        if !(self.coupling_tolerance_percent > 0.0) {
            return Err(out_of_range(
                "coupling_tolerance_percent",
                format!("must be > 0, got {}", self.coupling_tolerance_percent),
            ));
        }
        Ok(())
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            epsilon: self.geometry_epsilon,
            parity_retries: self.parity_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ProblemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let config = ProblemConfig::from_toml_str(
            r#"
            coordinate_type = "axisymmetric"
            threads = 2
            mesh_backend = "gmsh"
            "#,
        )
        .unwrap();
        assert_eq!(config.coordinate_type, CoordinateType::Axisymmetric);
        assert_eq!(config.threads, 2);
        assert_eq!(config.mesh_backend, MeshBackend::Gmsh);
        assert_eq!(config.mesh_cache_slots, 8);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            ProblemConfig::from_toml_str("geometry_epsilon = -1.0"),
            Err(ConfigError::OutOfRange {
                name: "geometry_epsilon",
                ..
            })
        ));
        assert!(matches!(
            ProblemConfig::from_toml_str("threads = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
