//! Root-finding formulation of the implicit derivative problem.

use nalgebra::DVector;
use rd_model::{Model, Stage, State};

use crate::error::{SolverError, SolverResult};

/// Find `x = [YDot; lambda]` with `R(Y, YDot, lambda) = 0` for a fixed `Y`.
///
/// Square by construction: `ny + nm` unknowns and as many residuals. There is
/// no objective; the only question asked is where the residual vanishes.
pub struct ImplicitDerivativeProblem<'a> {
    model: &'a Model,
    /// Solver-private copy, realized to `Dynamics`.
    state: State,
    ny: usize,
    nm: usize,
}

impl<'a> ImplicitDerivativeProblem<'a> {
    /// Bind a working copy of `state`.
    pub fn new(model: &'a Model, state: &State) -> SolverResult<Self> {
        let mut state = state.clone();
        model.realize(&mut state, Stage::Dynamics)?;
        let ny = model.ny();
        let nm = model.multiplier_count(&state);
        Ok(Self {
            model,
            state,
            ny,
            nm,
        })
    }

    pub fn num_unknowns(&self) -> usize {
        self.ny + self.nm
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn num_multipliers(&self) -> usize {
        self.nm
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Split an unknown vector into `(YDot, lambda)`.
    pub fn split(&self, x: &DVector<f64>) -> SolverResult<(DVector<f64>, DVector<f64>)> {
        if x.len() != self.num_unknowns() {
            return Err(SolverError::InvalidState {
                what: format!(
                    "unknown vector has length {}, expected {}",
                    x.len(),
                    self.num_unknowns()
                ),
            });
        }
        Ok((
            x.rows(0, self.ny).into_owned(),
            x.rows(self.ny, self.nm).into_owned(),
        ))
    }

    pub fn residual(&self, x: &DVector<f64>) -> SolverResult<DVector<f64>> {
        let (ydot, lambda) = self.split(x)?;
        Ok(self.model.calc_residuals(&self.state, &ydot, &lambda)?)
    }
}
