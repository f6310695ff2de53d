use clap::{Parser, Subcommand};
use nalgebra::DVector;
use rayon::prelude::*;
use rd_model::Model;
use rd_project::ModelDef;
use rd_sim::{ExplicitDynamics, ImplicitDynamics, IntegratorType, SimOptions, run_sim};
use rd_solver::{DerivativeSolver, DerivativeSolverConfig, JacobianKind};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("Project error: {0}")]
    Project(#[from] rd_project::ProjectError),

    #[error("Model error: {0}")]
    Model(#[from] rd_model::ModelError),

    #[error("Solver error: {0}")]
    Solver(#[from] rd_solver::SolverError),

    #[error("Simulation error: {0}")]
    Sim(#[from] rd_sim::SimError),

    #[error("Invalid argument: {0}")]
    InvalidArg(String),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "rd-cli")]
#[command(about = "Residual dynamics CLI - implicit residuals and derivative recovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a model document and print its state layout
    Validate {
        /// Path to the model YAML or JSON file
        model_path: PathBuf,
    },
    /// Evaluate implicit residuals at the default state
    Residuals {
        /// Path to the model YAML or JSON file
        model_path: PathBuf,
        /// Derivative guess, comma separated (empty means zeros)
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        ydot: Vec<f64>,
        /// Multiplier guess, comma separated (empty means zeros)
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        lambda: Vec<f64>,
    },
    /// Recover the derivative from the residual and compare with explicit dynamics
    Solve {
        /// Path to the model YAML or JSON file
        model_path: PathBuf,
        #[command(flatten)]
        solver: SolverArgs,
    },
    /// Integrate forward from the default state, printing CSV
    Simulate {
        /// Path to the model YAML or JSON file
        model_path: PathBuf,
        /// Time step in seconds
        #[arg(long, default_value_t = 1e-3)]
        dt: f64,
        /// End time in seconds
        #[arg(long, default_value_t = 1.0)]
        t_end: f64,
        /// Record every N-th step
        #[arg(long, default_value_t = 10)]
        record_every: usize,
        /// Use forward Euler instead of RK4
        #[arg(long)]
        euler: bool,
        /// Take derivatives from the implicit solver
        #[arg(long)]
        implicit: bool,
    },
    /// Solve derivatives over a range of one coordinate's value, in parallel
    Sweep {
        /// Path to the model YAML or JSON file
        model_path: PathBuf,
        /// Coordinate to sweep
        #[arg(long)]
        coordinate: String,
        #[arg(long, allow_negative_numbers = true)]
        min: f64,
        #[arg(long, allow_negative_numbers = true)]
        max: f64,
        /// Number of points, endpoints included
        #[arg(long, default_value_t = 11)]
        steps: usize,
        #[command(flatten)]
        solver: SolverArgs,
    },
}

#[derive(clap::Args)]
struct SolverArgs {
    /// Symmetric bound on every unknown
    #[arg(long, default_value_t = 1e4)]
    bound: f64,
    /// Use central differences for the Jacobian
    #[arg(long)]
    central: bool,
}

impl SolverArgs {
    fn config(&self) -> DerivativeSolverConfig {
        DerivativeSolverConfig {
            bound: self.bound,
            jacobian: if self.central {
                JacobianKind::Central
            } else {
                JacobianKind::Forward
            },
            ..DerivativeSolverConfig::default()
        }
    }
}

fn main() -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { model_path } => cmd_validate(&model_path),
        Commands::Residuals {
            model_path,
            ydot,
            lambda,
        } => cmd_residuals(&model_path, ydot, lambda),
        Commands::Solve { model_path, solver } => cmd_solve(&model_path, &solver),
        Commands::Simulate {
            model_path,
            dt,
            t_end,
            record_every,
            euler,
            implicit,
        } => {
            let opts = SimOptions {
                dt,
                t_end,
                record_every,
                integrator: if euler {
                    IntegratorType::ForwardEuler
                } else {
                    IntegratorType::RK4
                },
                ..SimOptions::default()
            };
            cmd_simulate(&model_path, &opts, implicit)
        }
        Commands::Sweep {
            model_path,
            coordinate,
            min,
            max,
            steps,
            solver,
        } => cmd_sweep(&model_path, &coordinate, min, max, steps, &solver),
    }
}

fn load_model(model_path: &Path) -> CliResult<(ModelDef, Model)> {
    let def = rd_project::load(model_path)?;
    let model = rd_project::build_model(&def)?;
    info!(model = %def.name, ny = model.ny(), "model loaded");
    Ok((def, model))
}

/// Label of row `i` of the full residual `[YDot rows; constraint rows]`.
fn row_label(model: &Model, i: usize) -> String {
    match model.index().label(i) {
        Some(label) => label.to_string(),
        None => format!("constraint[{}]", i - model.ny()),
    }
}

fn cmd_validate(model_path: &Path) -> CliResult<()> {
    println!("Validating model: {}", model_path.display());
    let (def, model) = load_model(model_path)?;
    let state = model.default_state()?;
    println!("✓ Model '{}' is valid", def.name);
    println!(
        "  nq = {}, nu = {}, nz = {}, multipliers = {}",
        model.nq(),
        model.nu(),
        model.nz(),
        model.multiplier_count(&state)
    );
    println!(
        "  implicit form: local = {}, subtree = {}",
        model.has_implicit_form_local(),
        model.has_implicit_form()
    );
    for (i, label) in model.index().labels().iter().enumerate() {
        println!("  [{i:>3}] {label}");
    }
    Ok(())
}

fn cmd_residuals(model_path: &Path, ydot: Vec<f64>, lambda: Vec<f64>) -> CliResult<()> {
    let (_, model) = load_model(model_path)?;
    let mut state = model.default_state()?;
    model.realize_dynamics(&mut state)?;
    let r = model.calc_residuals(&state, &DVector::from_vec(ydot), &DVector::from_vec(lambda))?;
    for (i, value) in r.iter().enumerate() {
        println!("{:<32} {:>16.9e}", row_label(&model, i), value);
    }
    println!("|r| = {:.6e}", r.norm());
    Ok(())
}

fn cmd_solve(model_path: &Path, args: &SolverArgs) -> CliResult<()> {
    let (_, model) = load_model(model_path)?;
    let mut state = model.default_state()?;
    if model.multiplier_count(&state) > 0 {
        model.project_constraints(&mut state, 1e-12)?;
    }

    let solver = DerivativeSolver::new(&model, args.config())?;
    let solution = solver.solve(&state)?;
    let (ydot, lambda) = model.calc_explicit_derivatives(&mut state)?;

    println!(
        "✓ Converged in {} iterations, |r| = {:.3e}",
        solution.iterations, solution.residual_norm
    );
    println!("{:<32} {:>16} {:>16}", "variable", "implicit", "explicit");
    for i in 0..model.ny() {
        println!(
            "{:<32} {:>16.9e} {:>16.9e}",
            row_label(&model, i),
            solution.ydot[i],
            ydot[i]
        );
    }
    for k in 0..lambda.len() {
        println!(
            "{:<32} {:>16.9e} {:>16.9e}",
            format!("lambda[{k}]"),
            solution.lambda[k],
            lambda[k]
        );
    }
    println!("max |difference| = {:.3e}", (&solution.ydot - &ydot).amax());
    Ok(())
}

fn cmd_simulate(model_path: &Path, opts: &SimOptions, implicit: bool) -> CliResult<()> {
    let (_, model) = load_model(model_path)?;
    let mut state = model.default_state()?;
    if model.multiplier_count(&state) > 0 {
        model.project_constraints(&mut state, 1e-12)?;
    }

    let record = if implicit {
        let mut dynamics = ImplicitDynamics::new(&model, &state, DerivativeSolverConfig::default())?;
        let record = run_sim(&mut dynamics, opts)?;
        info!(evaluations = dynamics.evaluations(), "implicit simulation finished");
        record
    } else {
        run_sim(&mut ExplicitDynamics::new(&model, &state), opts)?
    };

    let header: Vec<&str> = model.index().labels().iter().map(String::as_str).collect();
    println!("t,{}", header.join(","));
    for (t, y) in record.t.iter().zip(record.x.iter()) {
        let row: Vec<String> = y.iter().map(|v| format!("{v:.9e}")).collect();
        println!("{t:.6},{}", row.join(","));
    }
    Ok(())
}

struct SweepRow {
    value: f64,
    ydot: DVector<f64>,
    residual_norm: f64,
}

fn cmd_sweep(
    model_path: &Path,
    coordinate: &str,
    min: f64,
    max: f64,
    steps: usize,
    args: &SolverArgs,
) -> CliResult<()> {
    if steps < 2 || !(min.is_finite() && max.is_finite()) || min > max {
        return Err(CliError::InvalidArg(format!(
            "sweep needs min <= max and at least 2 steps, got [{min}, {max}] with {steps}"
        )));
    }
    let (_, model) = load_model(model_path)?;
    let template = model.default_state()?;
    let constrained = model.multiplier_count(&template) > 0;
    let solver = DerivativeSolver::new(&model, args.config())?;

    let rows: Vec<CliResult<SweepRow>> = (0..steps)
        .into_par_iter()
        .map(|k| -> CliResult<SweepRow> {
            let value = min + (max - min) * k as f64 / (steps - 1) as f64;
            let mut state = template.clone();
            model.set_coordinate_value(&mut state, coordinate, value)?;
            if constrained {
                model.project_constraints(&mut state, 1e-12)?;
            }
            let solution = solver.solve(&state)?;
            Ok(SweepRow {
                value,
                ydot: solution.ydot,
                residual_norm: solution.residual_norm,
            })
        })
        .collect();

    let header: Vec<String> = (0..model.ny())
        .map(|i| format!("d({})", row_label(&model, i)))
        .collect();
    println!("{coordinate},{},residual_norm", header.join(","));
    for row in rows {
        let row = row?;
        let ydot: Vec<String> = row.ydot.iter().map(|v| format!("{v:.9e}")).collect();
        println!("{:.9e},{},{:.3e}", row.value, ydot.join(","), row.residual_norm);
    }
    Ok(())
}
