pub mod config;
pub mod geom;
pub mod mesh;
pub mod sim;
mod uid;
pub mod vecutils;

// Prelude
pub use config::{ConfigError, ProblemConfig};
pub use geom::loops::{Diagnostic, Resolution, ResolveOptions, resolve};
pub use geom::model::{CoordinateType, Edge, Geometry, Label};
pub use geom::point::Point;
pub use geom::vector::Vector;
pub use mesh::generator::{CoarseGenerator, GenerationError, MeshGenerator, MeshGenerators};
pub use mesh::{Mesh, MeshBackend};
pub use sim::adaptivity::{AdaptivityPolicy, AdaptivityStrategy, ErrorNorm};
pub use sim::assembly::{Assembler, AssemblyError, ElementErrors, SolveContext, WeakForms};
pub use sim::cancel::CancellationToken;
pub use sim::field::{AnalysisType, CouplingKind, FieldConfig, FieldId, FieldRegistry};
pub use sim::nonlinear::{ConvergenceMeasure, LinearityType, NonlinearSettings};
pub use sim::orchestrator::{Problem, RunError, RunReport, RunState};
pub use sim::store::{AnalysisStep, Solution, SolutionStore};
pub use sim::transient::{TimeSettings, TimeStepMethod};
pub use uid::UID;
