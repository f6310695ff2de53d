//! Recover `YDot` and `lambda` from the implicit residual alone.

use nalgebra::DVector;
use rd_core::numeric::ensure_all_finite;
use rd_model::{Model, State};
use tracing::{debug, warn};

use crate::error::{SolverError, SolverResult};
use crate::jacobian::{JacobianKind, jacobian};
use crate::newton::{Bounds, NewtonConfig, newton_solve};
use crate::problem::ImplicitDerivativeProblem;

/// Derivative solver configuration.
#[derive(Debug, Clone)]
pub struct DerivativeSolverConfig {
    /// Symmetric box on every unknown, well above any physical value.
    pub bound: f64,
    /// Relative finite difference step.
    pub jacobian_epsilon: f64,
    pub jacobian: JacobianKind,
    pub newton: NewtonConfig,
}

impl Default for DerivativeSolverConfig {
    fn default() -> Self {
        Self {
            bound: 1e4,
            jacobian_epsilon: 1e-7,
            jacobian: JacobianKind::Forward,
            newton: NewtonConfig::default(),
        }
    }
}

/// Converged derivative and multipliers.
#[derive(Debug, Clone)]
pub struct DerivativeSolution {
    pub ydot: DVector<f64>,
    pub lambda: DVector<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Solves `R(Y, YDot, lambda) = 0` for `(YDot, lambda)` at caller-supplied states.
///
/// The unknown count and bounds are fixed when the solver is created, from the
/// model's default state or from the state passed to
/// [`for_state`](Self::for_state). Each [`solve`](Self::solve) works on a
/// private copy of the state and starts from zero.
pub struct DerivativeSolver<'a> {
    model: &'a Model,
    config: DerivativeSolverConfig,
    ny: usize,
    nm: usize,
    bounds: Bounds,
}

impl<'a> DerivativeSolver<'a> {
    pub fn new(model: &'a Model, config: DerivativeSolverConfig) -> SolverResult<Self> {
        Self::for_state(model, &model.default_state()?, config)
    }

    /// Size the unknowns from `state`, whose enabled constraints decide the
    /// multiplier count.
    pub fn for_state(
        model: &'a Model,
        state: &State,
        config: DerivativeSolverConfig,
    ) -> SolverResult<Self> {
        if !(config.bound.is_finite() && config.bound > 0.0) {
            return Err(SolverError::ProblemSetup {
                what: format!("bound must be positive, got {}", config.bound),
            });
        }
        if !(config.jacobian_epsilon.is_finite() && config.jacobian_epsilon > 0.0) {
            return Err(SolverError::ProblemSetup {
                what: "jacobian epsilon must be positive".to_string(),
            });
        }
        if state.ny() != model.ny() {
            return Err(SolverError::ProblemSetup {
                what: format!(
                    "state has {} variables, model has {}",
                    state.ny(),
                    model.ny()
                ),
            });
        }
        let ny = model.ny();
        let nm = model.multiplier_count(state);
        debug!(ny, nm, bound = config.bound, "derivative solver configured");
        Ok(Self {
            model,
            bounds: Bounds::symmetric(ny + nm, config.bound),
            config,
            ny,
            nm,
        })
    }

    pub fn with_defaults(model: &'a Model) -> SolverResult<Self> {
        Self::new(model, DerivativeSolverConfig::default())
    }

    pub fn config(&self) -> &DerivativeSolverConfig {
        &self.config
    }

    pub fn num_unknowns(&self) -> usize {
        self.ny + self.nm
    }

    pub fn solve(&self, state: &State) -> SolverResult<DerivativeSolution> {
        self.solve_from(state, &DVector::zeros(self.num_unknowns()))
    }

    /// Solve starting from `initial = [YDot; lambda]`.
    pub fn solve_from(
        &self,
        state: &State,
        initial: &DVector<f64>,
    ) -> SolverResult<DerivativeSolution> {
        let problem = ImplicitDerivativeProblem::new(self.model, state)?;
        if problem.ny() != self.ny || problem.num_multipliers() != self.nm {
            return Err(SolverError::ProblemSetup {
                what: format!(
                    "solver configured for {} states and {} multipliers, state has {} and {}",
                    self.ny,
                    self.nm,
                    problem.ny(),
                    problem.num_multipliers()
                ),
            });
        }
        if initial.len() != self.num_unknowns() {
            return Err(SolverError::ProblemSetup {
                what: format!(
                    "initial guess has length {}, expected {}",
                    initial.len(),
                    self.num_unknowns()
                ),
            });
        }
        ensure_all_finite(initial.as_slice(), "initial guess").map_err(|e| {
            SolverError::ProblemSetup {
                what: e.to_string(),
            }
        })?;

        let jac = |x: &DVector<f64>| {
            jacobian(
                self.config.jacobian,
                x,
                |y: &DVector<f64>| problem.residual(y),
                self.config.jacobian_epsilon,
            )
        };
        let result = newton_solve(
            initial.clone(),
            |x: &DVector<f64>| problem.residual(x),
            jac,
            Some(&self.bounds),
            &self.config.newton,
        )
        .inspect_err(|e| warn!(model = self.model.name(), error = %e, "derivative solve failed"))?;

        let (ydot, lambda) = problem.split(&result.x)?;
        debug!(
            iterations = result.iterations,
            residual_norm = result.residual_norm,
            "derivative solve converged"
        );
        Ok(DerivativeSolution {
            ydot,
            lambda,
            residual_norm: result.residual_norm,
            iterations: result.iterations,
        })
    }
}
