//! Top-level solve state machine.
//!
//! A [`Problem`] owns the geometry, the field registry and the run
//! configuration. [`Problem::mesh`] resolves the topology and produces a mesh,
//! [`Problem::solve`] drives steady, coupled and transient solves and writes
//! every accepted solution into the [`SolutionStore`].
//!
//! Work inside one step runs on the problem's worker pool: fields of one
//! coupling level are dispatched in parallel, and each adaptivity step joins
//! its coarse and reference solves. Coupled passes and time steps are
//! strictly sequential.

use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ProblemConfig, out_of_range};
use crate::geom::loops::{Diagnostic, Resolution, resolve};
use crate::geom::model::Geometry;
use crate::mesh::Mesh;
use crate::mesh::cache::MeshCache;
use crate::mesh::generator::{GenerationError, MeshGenerators, generate_mesh};
use crate::sim::adaptivity::{
    AdaptiveStep, AdaptivityError, AdaptivityPolicy, AdaptivityRun, AdaptivityStrategy,
    run_adaptivity,
};
use crate::sim::assembly::{Assembler, CoupledInput, SolveContext};
use crate::sim::cancel::CancellationToken;
use crate::sim::field::{CouplingEdge, FieldConfig, FieldId, FieldRegistry};
use crate::sim::store::{AnalysisStep, Solution, SolutionStore, StoreError};
use crate::sim::transient::{
    MAX_BDF_ORDER, StepDecision, TimeStepMethod, TimeStepper, bdf_coefficients, extrapolate,
    startup_order, time_error_percent,
};
use crate::vecutils::relative_change_percent;

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    NotMeshed,
    Meshed,
    /// Solving the given time index (0 for steady problems).
    Solving(usize),
    Converged,
    Failed(String),
    Cancelled,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("mesh generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("problem is not meshed")]
    NotMeshed,
    #[error("{field} failed at time step {time_index}: {source}")]
    Step {
        field: FieldId,
        time_index: usize,
        #[source]
        source: AdaptivityError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot build worker pool: {0}")]
    ThreadPool(String),
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: RunState,
    /// Solutions in the store when the run ended.
    pub solutions: usize,
    /// Accepted time steps (0 for steady problems).
    pub time_steps: usize,
    pub rejected_time_steps: usize,
    /// Coupled passes summed over all steps.
    pub coupling_passes: usize,
    pub final_time: f64,
}

impl RunReport {
    fn new() -> Self {
        Self {
            state: RunState::Converged,
            solutions: 0,
            time_steps: 0,
            rejected_time_steps: 0,
            coupling_passes: 0,
            final_time: 0.0,
        }
    }
}

/// Per-field state carried from one time step to the next.
struct FieldTrack {
    /// Mesh accepted at each time index; index 0 is the initial mesh.
    meshes: Vec<Arc<Mesh>>,
    /// Accepted solutions, most recent first. Starts with the initial
    /// condition for transient fields.
    history: Vec<Arc<Solution>>,
}

impl FieldTrack {
    fn new(id: FieldId, field: &FieldConfig, mesh: &Arc<Mesh>) -> Self {
        let history = if field.is_transient() {
            vec![Arc::new(Solution {
                key: AnalysisStep::new(id, 0, 0),
                time: 0.0,
                mesh: mesh.clone(),
                coefficients: vec![field.initial_condition; mesh.dof_count()],
                error_percent: None,
                iterations: 0,
            })]
        } else {
            Vec::new()
        };
        Self {
            meshes: vec![mesh.clone()],
            history,
        }
    }

    fn latest_mesh(&self) -> Arc<Mesh> {
        self.meshes[self.meshes.len() - 1].clone()
    }

    /// Start mesh and effective policy for time step `index`.
    ///
    /// Adaptivity is redone every `transient_redone_each` steps, starting
    /// from the mesh accepted `transient_back_steps` steps earlier (the
    /// initial mesh for 0). In between, the last mesh is reused as is.
    fn start(&self, policy: &AdaptivityPolicy, index: usize) -> (Arc<Mesh>, AdaptivityPolicy) {
        if !policy.is_enabled() || index == 0 {
            return (self.meshes[0].clone(), policy.clone());
        }
        if (index - 1) % policy.transient_redone_each != 0 {
            let frozen = AdaptivityPolicy {
                strategy: AdaptivityStrategy::Disabled,
                ..policy.clone()
            };
            return (self.latest_mesh(), frozen);
        }
        let back = policy.transient_back_steps;
        let from = if back == 0 {
            0
        } else {
            self.meshes.len().saturating_sub(back)
        };
        (self.meshes[from].clone(), policy.clone())
    }
}

/// Results of all fields for one time step.
struct StepOutcome {
    /// Indexed by field id.
    runs: Vec<Option<AdaptivityRun>>,
    passes: usize,
}

fn snapshot(field: FieldId, time_index: usize, time: f64, step: &AdaptiveStep) -> Solution {
    Solution {
        key: AnalysisStep::new(field, time_index, step.index),
        time,
        mesh: step.mesh.clone(),
        coefficients: step.solution.clone(),
        error_percent: step.error_percent,
        iterations: step.iterations,
    }
}

/// Largest relative change (%) of any field between two coupled passes.
fn largest_change(current: &[Option<Arc<Solution>>], previous: &[Option<Arc<Solution>>]) -> f64 {
    current
        .iter()
        .zip(previous)
        .map(|(c, p)| match (c, p) {
            (Some(c), Some(p)) if c.coefficients.len() == p.coefficients.len() => {
                relative_change_percent(&c.coefficients, &p.coefficients)
            }
            (Some(_), _) => 100.0,
            (None, _) => 0.0,
        })
        .fold(0.0, f64::max)
}

pub struct Problem {
    geometry: Geometry,
    registry: FieldRegistry,
    config: ProblemConfig,
    generators: MeshGenerators,
    assembler: Arc<dyn Assembler>,
    pool: rayon::ThreadPool,
    resolution: Option<Resolution>,
    mesh: Option<Arc<Mesh>>,
    cache: MeshCache,
    store: Arc<SolutionStore>,
    state: RwLock<RunState>,
    cancel: CancellationToken,
}

impl Problem {
    pub fn new(
        geometry: Geometry,
        registry: FieldRegistry,
        config: ProblemConfig,
        generators: MeshGenerators,
        assembler: Arc<dyn Assembler>,
    ) -> Result<Self, RunError> {
        config.validate()?;
        if geometry.coordinate_type() != config.coordinate_type {
            return Err(out_of_range(
                "coordinate_type",
                format!(
                    "geometry is {:?} but the problem is {:?}",
                    geometry.coordinate_type(),
                    config.coordinate_type
                ),
            )
            .into());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("field2d-worker-{i}"))
            .build()
            .map_err(|e| RunError::ThreadPool(e.to_string()))?;

        Ok(Self {
            geometry,
            registry,
            cache: MeshCache::new(config.mesh_cache_slots),
            config,
            generators,
            assembler,
            pool,
            resolution: None,
            mesh: None,
            store: Arc::new(SolutionStore::new()),
            state: RwLock::new(RunState::NotMeshed),
            cancel: CancellationToken::new(),
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FieldRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state.read().clone()
    }

    /// Shared handle to the solution history, readable while a run is in
    /// progress.
    pub fn store(&self) -> Arc<SolutionStore> {
        self.store.clone()
    }

    /// Token that stops a running [`Problem::solve`] at the next step
    /// boundary. It stays set until reset.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Diagnostics of the last topology resolution.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.resolution
            .as_ref()
            .map(|r| r.diagnostics.as_slice())
            .unwrap_or_default()
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn current_mesh(&self) -> Option<Arc<Mesh>> {
        self.mesh.clone()
    }

    pub fn mesh_cache(&self) -> &MeshCache {
        &self.cache
    }

    /// Applies a geometry edit. The mesh and the topology are invalidated.
    pub fn edit_geometry<R>(&mut self, edit: impl FnOnce(&mut Geometry) -> R) -> R {
        let out = edit(&mut self.geometry);
        self.mesh = None;
        self.resolution = None;
        *self.state.get_mut() = RunState::NotMeshed;
        out
    }

    /// Resolves the topology and produces the initial mesh.
    ///
    /// Fatal diagnostics block meshing; they are logged and stay available
    /// through [`Problem::diagnostics`]. A geometry meshed before with the
    /// same backend is served from the mesh cache.
    pub fn mesh(&mut self) -> Result<Arc<Mesh>, RunError> {
        self.mesh = None;
        *self.state.get_mut() = RunState::NotMeshed;

        let resolution = self
            .resolution
            .insert(resolve(&self.geometry, &self.config.resolve_options()));
        for d in &resolution.diagnostics {
            if d.is_fatal() {
                warn!(diagnostic = %d, "Geometry error");
            } else {
                debug!(diagnostic = %d, "Geometry warning");
            }
        }

        let key = (self.geometry.fingerprint(), self.config.mesh_backend);
        let cached = if resolution.is_valid() {
            self.cache.get(key)
        } else {
            None
        };
        let mesh = match cached {
            Some(mesh) => {
                debug!(mesh = %mesh.uid.short(), "Mesh cache hit");
                mesh
            }
            None => {
                let mesh = Arc::new(generate_mesh(
                    &self.generators,
                    &self.geometry,
                    resolution,
                    self.config.mesh_backend,
                )?);
                self.cache.insert(key, mesh.clone());
                mesh
            }
        };

        self.mesh = Some(mesh.clone());
        *self.state.get_mut() = RunState::Meshed;
        Ok(mesh)
    }

    /// Runs all fields to the end of the simulation.
    ///
    /// The store is cleared first. A failure keeps every solution accepted
    /// before it and leaves the problem in [`RunState::Failed`]. A cancelled
    /// run keeps its accepted solutions too and returns a report with
    /// [`RunState::Cancelled`].
    pub fn solve(&self) -> Result<RunReport, RunError> {
        let (levels, mesh) = match self.preconditions() {
            Ok(ready) => ready,
            Err(e) => {
                error!(error = %e, "Solve not started");
                *self.state.write() = RunState::Failed(e.to_string());
                return Err(e);
            }
        };
        self.store.clear();
        info!(
            fields = self.registry.len(),
            transient = self.registry.is_transient(),
            threads = self.pool.current_num_threads(),
            "Solve started"
        );

        match self.pool.install(|| self.run(&levels, &mesh)) {
            Ok(report) => {
                *self.state.write() = report.state.clone();
                info!(
                    state = ?report.state,
                    solutions = report.solutions,
                    time_steps = report.time_steps,
                    "Solve finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, solutions = self.store.len(), "Solve failed");
                *self.state.write() = RunState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn preconditions(&self) -> Result<(Vec<Vec<FieldId>>, Arc<Mesh>), RunError> {
        self.registry.validate()?;
        let levels = self.registry.levels()?;
        let mesh = self.mesh.clone().ok_or(RunError::NotMeshed)?;
        Ok((levels, mesh))
    }

    fn run(&self, levels: &[Vec<FieldId>], mesh: &Arc<Mesh>) -> Result<RunReport, RunError> {
        let couplings = self.registry.effective_couplings();
        let mut tracks: Vec<FieldTrack> = self
            .registry
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| FieldTrack::new(FieldId(i), f, mesh))
            .collect();
        let mut report = RunReport::new();

        let Some(clock) = self.registry.time_settings().cloned() else {
            *self.state.write() = RunState::Solving(0);
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(report));
            }
            let Some(step) = self.coupled_step(levels, &couplings, &tracks, 0, 0.0, None)? else {
                return Ok(self.cancelled(report));
            };
            report.coupling_passes += step.passes;
            self.commit(0, 0.0, step, &mut tracks)?;
            report.solutions = self.store.len();
            return Ok(report);
        };

        let mut stepper = TimeStepper::new(clock.clone());
        while !stepper.is_finished() {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(report));
            }
            let index = stepper.index() + 1;
            *self.state.write() = RunState::Solving(index);

            let (step, dt) = loop {
                let dt = stepper.next_step();
                let time = stepper.time() + dt;
                let Some(step) =
                    self.coupled_step(levels, &couplings, &tracks, index, time, Some(dt))?
                else {
                    return Ok(self.cancelled(report));
                };
                report.coupling_passes += step.passes;
                if clock.method == TimeStepMethod::Fixed {
                    break (step, dt);
                }
                // Only the initial condition is known: no error estimate yet
                let Some(error) = self.time_error(&tracks, &step, time) else {
                    break (step, dt);
                };
                match stepper.adapt(error) {
                    StepDecision::Accept => break (step, dt),
                    StepDecision::Reject => {
                        report.rejected_time_steps += 1;
                        if self.cancel.is_cancelled() {
                            return Ok(self.cancelled(report));
                        }
                    }
                }
            };

            stepper.accept(dt);
            self.commit(index, stepper.time(), step, &mut tracks)?;
            report.time_steps = stepper.index();
            report.final_time = stepper.time();
            debug!(time_index = index, time = stepper.time(), time_step = dt, "Time step accepted");
        }
        report.solutions = self.store.len();
        Ok(report)
    }

    fn cancelled(&self, mut report: RunReport) -> RunReport {
        report.state = RunState::Cancelled;
        report.solutions = self.store.len();
        info!(solutions = report.solutions, "Solve cancelled");
        report
    }

    /// Solves every field once per coupled pass until the passes stabilize.
    ///
    /// Within a pass, a field reads the current pass's solution of sources in
    /// earlier levels and the previous pass's (frozen) solution otherwise.
    /// Returns `None` when cancelled between passes.
    fn coupled_step(
        &self,
        levels: &[Vec<FieldId>],
        couplings: &[CouplingEdge],
        tracks: &[FieldTrack],
        index: usize,
        time: f64,
        dt: Option<f64>,
    ) -> Result<Option<StepOutcome>, RunError> {
        let n = tracks.len();
        let max_passes = if couplings.is_empty() {
            1
        } else {
            self.config.max_coupling_passes
        };
        let mut frozen: Vec<Option<Arc<Solution>>> =
            tracks.iter().map(|t| t.history.first().cloned()).collect();
        let mut runs: Vec<Option<AdaptivityRun>> = vec![None; n];
        let mut passes = 0;

        for pass in 1..=max_passes {
            if pass > 1 && self.cancel.is_cancelled() {
                return Ok(None);
            }
            let mut current: Vec<Option<Arc<Solution>>> = vec![None; n];
            for level in levels {
                let solved: Vec<Result<AdaptivityRun, RunError>> = level
                    .par_iter()
                    .map(|&id| {
                        let inputs: Vec<CoupledInput> = couplings
                            .iter()
                            .filter(|c| c.target == id)
                            .filter_map(|c| {
                                current[c.source.0]
                                    .clone()
                                    .or_else(|| frozen[c.source.0].clone())
                                    .map(|solution| CoupledInput {
                                        source: c.source,
                                        solution,
                                    })
                            })
                            .collect();
                        self.solve_field(
                            id,
                            &tracks[id.0],
                            index,
                            time,
                            dt,
                            &inputs,
                            frozen[id.0].as_deref(),
                        )
                    })
                    .collect();
                for (&id, result) in level.iter().zip(solved) {
                    let run = result?;
                    current[id.0] = run.last().map(|s| Arc::new(snapshot(id, index, time, s)));
                    runs[id.0] = Some(run);
                }
            }
            passes = pass;
            let change = largest_change(&current, &frozen);
            frozen = current;
            if max_passes > 1 {
                debug!(time_index = index, pass, change_percent = change, "Coupled pass");
                if pass >= 2 && change < self.config.coupling_tolerance_percent {
                    break;
                }
                if pass == max_passes {
                    warn!(
                        time_index = index,
                        passes = pass,
                        change_percent = change,
                        "Coupled passes did not stabilize"
                    );
                }
            }
        }
        Ok(Some(StepOutcome { runs, passes }))
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_field(
        &self,
        id: FieldId,
        track: &FieldTrack,
        index: usize,
        time: f64,
        dt: Option<f64>,
        coupled: &[CoupledInput],
        guess: Option<&Solution>,
    ) -> Result<AdaptivityRun, RunError> {
        let field = &self.registry.fields()[id.0];
        let (start_mesh, policy) = track.start(&field.adaptivity, index);
        let transient = field.is_transient();
        let bdf = transient
            .then(|| bdf_coefficients(startup_order(field.time.order, track.history.len())));
        let ctx = SolveContext {
            field: id,
            analysis: field.analysis,
            linearity: field.nonlinear.linearity,
            previous: &[],
            time,
            time_step: if transient { dt } else { None },
            bdf: bdf.as_ref(),
            history: &track.history,
            coupled,
            frequency: field.frequency,
        };
        let initial = guess.map(|s| (s.mesh.as_ref(), s.coefficients.as_slice()));

        run_adaptivity(
            self.assembler.as_ref(),
            start_mesh,
            &field.weak_forms,
            &field.nonlinear,
            &policy,
            &ctx,
            initial,
        )
        .map_err(|source| {
            if source.is_external() {
                error!(field = %id, time_index = index, error = %source, "Unknown solver exception");
            }
            RunError::Step {
                field: id,
                time_index: index,
                source,
            }
        })
    }

    /// Largest time discretization error (%) over the transient fields.
    ///
    /// The predictor extrapolates linearly from the two most recent accepted
    /// levels. `None` when no field has two levels on a matching mesh.
    fn time_error(&self, tracks: &[FieldTrack], outcome: &StepOutcome, time: f64) -> Option<f64> {
        let mut worst: Option<f64> = None;
        for (i, field) in self.registry.fields().iter().enumerate() {
            if !field.is_transient() {
                continue;
            }
            let Some(step) = outcome.runs[i].as_ref().and_then(AdaptivityRun::last) else {
                continue;
            };
            let history: Vec<(f64, &[f64])> = tracks[i]
                .history
                .iter()
                .map(|s| (s.time, s.coefficients.as_slice()))
                .filter(|(_, c)| c.len() == step.solution.len())
                .take(2)
                .collect();
            if history.len() < 2 {
                continue;
            }
            let error = time_error_percent(&extrapolate(&history, time), &step.solution);
            worst = Some(worst.map_or(error, |w| w.max(error)));
        }
        worst
    }

    /// Stores the accepted steps and advances the per-field history.
    fn commit(
        &self,
        index: usize,
        time: f64,
        outcome: StepOutcome,
        tracks: &mut [FieldTrack],
    ) -> Result<(), RunError> {
        for (i, run) in outcome.runs.into_iter().enumerate() {
            let Some(run) = run else {
                continue;
            };
            let id = FieldId(i);
            let mut last = None;
            for step in &run.steps {
                last = Some(self.store.insert(snapshot(id, index, time, step))?);
            }
            if let Some(last) = last {
                let track = &mut tracks[i];
                track.meshes.push(last.mesh.clone());
                track.history.insert(0, last);
                track.history.truncate(MAX_BDF_ORDER);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::model::{CoordinateType, Edge, Label};
    use crate::geom::point::Point;
    use crate::mesh::generator::CoarseGenerator;
    use crate::sim::adaptivity::ErrorNorm;
    use crate::sim::assembly::{AssemblyError, ElementErrors, WeakForms};

    /// Returns the mean of the coupled inputs plus one.
    struct Follow;

    impl Assembler for Follow {
        fn assemble_and_solve(
            &self,
            mesh: &Mesh,
            _: &WeakForms,
            ctx: &SolveContext,
        ) -> Result<Vec<f64>, AssemblyError> {
            let input: f64 = ctx
                .coupled
                .iter()
                .map(|c| c.solution.coefficients.iter().sum::<f64>() / c.solution.coefficients.len() as f64)
                .sum();
            Ok(vec![input + 1.0; mesh.dof_count()])
        }

        fn element_errors(
            &self,
            coarse_mesh: &Mesh,
            _: &[f64],
            _: &Mesh,
            _: &[f64],
            _: ErrorNorm,
        ) -> Result<ElementErrors, AssemblyError> {
            Ok(ElementErrors {
                per_element: vec![0.0; coarse_mesh.element_count()],
                reference_norm: 1.0,
            })
        }
    }

    fn square() -> Geometry {
        let mut g = Geometry::new(CoordinateType::Planar);
        let pts = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        for (x, y) in pts {
            g.add_node(Point::new(x, y)).unwrap();
        }
        for i in 0..4 {
            g.add_edge(Edge::new(i, (i + 1) % 4)).unwrap();
        }
        g.add_label(Label::new(Point::new(0.5, 0.5), "air")).unwrap();
        g
    }

    fn problem(registry: FieldRegistry) -> Problem {
        Problem::new(
            square(),
            registry,
            ProblemConfig {
                threads: 2,
                ..ProblemConfig::default()
            },
            MeshGenerators::new().with(Arc::new(CoarseGenerator::default())),
            Arc::new(Follow),
        )
        .unwrap()
    }

    #[test]
    fn test_track_start_mesh() {
        let mesh = Arc::new(Mesh::new(crate::mesh::MeshBackend::Triangle, vec![]));
        let field = FieldConfig::new("f", WeakForms::new("f"));
        let mut track = FieldTrack::new(FieldId(0), &field, &mesh);
        for _ in 0..3 {
            track.meshes.push(Arc::new(Mesh::new(crate::mesh::MeshBackend::Triangle, vec![])));
        }
        let policy = AdaptivityPolicy {
            strategy: AdaptivityStrategy::H,
            transient_back_steps: 2,
            transient_redone_each: 2,
            ..AdaptivityPolicy::default()
        };
        // Step 4: (4 - 1) % 2 != 0, reuse the latest mesh without adaptivity
        let (m, p) = track.start(&policy, 4);
        assert_eq!(m.uid, track.meshes[3].uid);
        assert!(!p.is_enabled());
        // Step 5: redo from two steps back
        let (m, p) = track.start(&policy, 5);
        assert_eq!(m.uid, track.meshes[2].uid);
        assert!(p.is_enabled());
    }

    #[test]
    fn test_weak_coupling_chain() {
        let mut registry = FieldRegistry::new();
        let a = registry.add_field(FieldConfig::new("a", WeakForms::new("a")));
        let b = registry.add_field(FieldConfig::new("b", WeakForms::new("b")));
        registry.add_coupling(a, b, crate::sim::field::CouplingKind::Weak).unwrap();
        let mut problem = problem(registry);
        problem.mesh().unwrap();
        let report = problem.solve().unwrap();
        assert_eq!(report.state, RunState::Converged);
        // Acyclic chain settles on the second pass
        assert_eq!(report.coupling_passes, 2);
        let store = problem.store();
        let b = store.latest(b).unwrap();
        assert!(b.coefficients.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_largest_change() {
        let mesh = Arc::new(Mesh::new(crate::mesh::MeshBackend::Triangle, vec![]));
        let sol = |v: f64| {
            Some(Arc::new(Solution {
                key: AnalysisStep::new(FieldId(0), 0, 0),
                time: 0.0,
                mesh: mesh.clone(),
                coefficients: vec![v; 2],
                error_percent: None,
                iterations: 1,
            }))
        };
        assert_eq!(largest_change(&[sol(2.0)], &[sol(2.0)]), 0.0);
        assert_eq!(largest_change(&[sol(2.0)], &[None]), 100.0);
        assert_eq!(largest_change(&[sol(2.0), sol(4.0)], &[sol(1.0), sol(4.0)]), 50.0);
    }
}
