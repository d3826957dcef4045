use std::sync::Arc;

use anyhow::{Context, Result};
use field2d::{
    AdaptivityPolicy, AdaptivityStrategy, Assembler, AssemblyError, CoarseGenerator, Edge,
    ElementErrors, ErrorNorm, FieldConfig, FieldRegistry, Geometry, Label, Mesh, MeshGenerators,
    Point, Problem, ProblemConfig, SolveContext, WeakForms,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stand-in for a finite element assembler: the solution is the `source`
/// parameter everywhere, the error of an element shrinks with its size and
/// order.
struct UniformSource;

impl Assembler for UniformSource {
    fn assemble_and_solve(
        &self,
        mesh: &Mesh,
        forms: &WeakForms,
        _ctx: &SolveContext,
    ) -> Result<Vec<f64>, AssemblyError> {
        let source = forms.parameter("source").unwrap_or(1.0);
        Ok(vec![source; mesh.dof_count()])
    }

    fn element_errors(
        &self,
        coarse_mesh: &Mesh,
        _coarse: &[f64],
        _reference_mesh: &Mesh,
        _reference: &[f64],
        _norm: ErrorNorm,
    ) -> Result<ElementErrors, AssemblyError> {
        Ok(ElementErrors {
            per_element: coarse_mesh
                .elements
                .iter()
                .map(|e| e.area.powf((e.order as f64 + 1.0) / 2.0))
                .collect(),
            reference_norm: 1.0,
        })
    }
}

fn init_logging() {
    let log_format = std::env::var("FIELD2D_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "field2d=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

fn unit_square(config: &ProblemConfig) -> Result<Geometry> {
    let mut geometry = Geometry::new(config.coordinate_type);
    let corners = [(0., 0.), (1., 0.), (1., 1.), (0., 1.)];
    for (x, y) in corners {
        geometry.add_node(Point::new(x, y))?;
    }
    for i in 0..4 {
        geometry.add_edge(Edge::new(i, (i + 1) % 4).with_boundary("wall"))?;
    }
    geometry.add_label(Label::new(Point::new(0.5, 0.5), "copper").with_area(0.25))?;
    Ok(geometry)
}

fn main() -> Result<()> {
    init_logging();

    // Optional TOML configuration as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read configuration {path}"))?;
            ProblemConfig::from_toml_str(&text).with_context(|| format!("invalid configuration {path}"))?
        }
        None => ProblemConfig::default(),
    };

    let mut registry = FieldRegistry::new();
    registry.add_field(
        FieldConfig::new("electrostatic", WeakForms::new("electrostatic").with_parameter("source", 2.0))
            .with_adaptivity(AdaptivityPolicy {
                strategy: AdaptivityStrategy::H,
                tolerance_percent: 5.0,
                ..AdaptivityPolicy::default()
            }),
    );

    let generators = MeshGenerators::new().with(Arc::new(CoarseGenerator::new(config.mesh_backend)));
    let mut problem = Problem::new(
        unit_square(&config)?,
        registry,
        config,
        generators,
        Arc::new(UniformSource),
    )?;

    let mesh = problem.mesh()?;
    info!(elements = mesh.element_count(), dofs = mesh.dof_count(), "Initial mesh");

    let report = problem.solve()?;
    println!("{report:?}");
    for solution in problem.store().iter() {
        println!(
            "{:?}: {} dofs, error {:.3} %",
            solution.key,
            solution.coefficients.len(),
            solution.error_percent.unwrap_or(0.0)
        );
    }
    Ok(())
}
