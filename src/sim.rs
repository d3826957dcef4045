//! Solve orchestration: fields, nonlinear iterations, adaptivity, time
//! stepping and the solution history.

pub mod adaptivity;
pub mod assembly;
pub mod cancel;
pub mod dense;
pub mod field;
pub mod nonlinear;
pub mod orchestrator;
pub mod store;
pub mod transient;
