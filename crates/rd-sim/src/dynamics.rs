//! [`TransientModel`] adapters over a built [`Model`].
//!
//! The integrated state is the bare `Y` vector. Both adapters keep a working
//! [`State`] that is overwritten at every right-hand-side evaluation, so
//! constraint-enabled flags of the template carry through the whole run.

use nalgebra::DVector;
use rd_model::{Model, State};
use rd_solver::{DerivativeSolver, DerivativeSolverConfig};
use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::model::TransientModel;

fn load(work: &mut State, t: f64, y: &DVector<f64>) -> SimResult<()> {
    if !t.is_finite() {
        return Err(SimError::InvalidArg {
            what: "time must be finite",
        });
    }
    work.set_time(t);
    work.set_y(y)?;
    Ok(())
}

/// Forward dynamics through the explicit path (`KKT` solve plus auxiliary derivatives).
pub struct ExplicitDynamics<'a> {
    model: &'a Model,
    initial: DVector<f64>,
    work: State,
}

impl<'a> ExplicitDynamics<'a> {
    /// Integrate from `template`, which supplies `Y(0)` and constraint flags.
    pub fn new(model: &'a Model, template: &State) -> Self {
        Self {
            model,
            initial: template.y().clone(),
            work: template.clone(),
        }
    }

    /// Start from the model's default state.
    pub fn from_defaults(model: &'a Model) -> SimResult<Self> {
        Ok(Self::new(model, &model.default_state()?))
    }
}

impl TransientModel for ExplicitDynamics<'_> {
    type State = DVector<f64>;

    fn initial_state(&self) -> SimResult<DVector<f64>> {
        Ok(self.initial.clone())
    }

    fn rhs(&mut self, t: f64, y: &DVector<f64>) -> SimResult<DVector<f64>> {
        load(&mut self.work, t, y)?;
        let (ydot, _) = self.model.calc_explicit_derivatives(&mut self.work)?;
        Ok(ydot)
    }

    fn add(&self, a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
        a + b
    }

    fn scale(&self, a: &DVector<f64>, scale: f64) -> DVector<f64> {
        a * scale
    }
}

/// Forward dynamics recovered from the residual operator alone.
///
/// Each evaluation warm-starts Newton from the previous `[YDot; lambda]`.
pub struct ImplicitDynamics<'a> {
    solver: DerivativeSolver<'a>,
    initial: DVector<f64>,
    work: State,
    last: DVector<f64>,
    evaluations: usize,
}

impl<'a> ImplicitDynamics<'a> {
    pub fn new(model: &'a Model, template: &State, config: DerivativeSolverConfig) -> SimResult<Self> {
        let solver = DerivativeSolver::for_state(model, template, config)?;
        let last = DVector::zeros(solver.num_unknowns());
        Ok(Self {
            solver,
            initial: template.y().clone(),
            work: template.clone(),
            last,
            evaluations: 0,
        })
    }

    pub fn from_defaults(model: &'a Model) -> SimResult<Self> {
        Self::new(
            model,
            &model.default_state()?,
            DerivativeSolverConfig::default(),
        )
    }

    /// Number of right-hand-side evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Multipliers from the most recent evaluation.
    pub fn last_multipliers(&self) -> DVector<f64> {
        let ny = self.initial.len();
        self.last.rows(ny, self.last.len() - ny).into_owned()
    }
}

impl TransientModel for ImplicitDynamics<'_> {
    type State = DVector<f64>;

    fn initial_state(&self) -> SimResult<DVector<f64>> {
        Ok(self.initial.clone())
    }

    fn rhs(&mut self, t: f64, y: &DVector<f64>) -> SimResult<DVector<f64>> {
        load(&mut self.work, t, y)?;
        let solution = self.solver.solve_from(&self.work, &self.last)?;
        trace!(
            t,
            iterations = solution.iterations,
            residual_norm = solution.residual_norm,
            "implicit derivative"
        );
        self.last.rows_mut(0, solution.ydot.len()).copy_from(&solution.ydot);
        let ny = solution.ydot.len();
        self.last
            .rows_mut(ny, solution.lambda.len())
            .copy_from(&solution.lambda);
        self.evaluations += 1;
        Ok(solution.ydot)
    }

    fn add(&self, a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
        a + b
    }

    fn scale(&self, a: &DVector<f64>, scale: f64) -> DVector<f64> {
        a * scale
    }
}
