//! System state: time, `Y = [q; u; z]`, constraint enablement, realization cache.

use crate::error::{ModelError, ModelResult};
use crate::stage::Stage;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConstraintSlot {
    pub equations: usize,
    pub enabled: bool,
}

/// Quantities computed by realization, valid up to [`State::stage`].
#[derive(Debug, Clone)]
pub(crate) struct RealizationCache {
    /// Position.
    pub mass_matrix: DMatrix<f64>,
    /// Position: rows of enabled constraints only.
    pub constraint_jacobian: DMatrix<f64>,
    /// Position.
    pub position_errors: DVector<f64>,
    /// Velocity: acceleration error is `G * uDot + bias`.
    pub acceleration_bias: DVector<f64>,
    /// Dynamics.
    pub applied_forces: DVector<f64>,
    /// Acceleration.
    pub ydot: DVector<f64>,
    /// Acceleration.
    pub multipliers: DVector<f64>,
}

impl RealizationCache {
    fn sized(nu: usize, ny: usize, nm: usize) -> Self {
        Self {
            mass_matrix: DMatrix::zeros(nu, nu),
            constraint_jacobian: DMatrix::zeros(nm, nu),
            position_errors: DVector::zeros(nm),
            acceleration_bias: DVector::zeros(nm),
            applied_forces: DVector::zeros(nu),
            ydot: DVector::zeros(ny),
            multipliers: DVector::zeros(nm),
        }
    }
}

/// A snapshot of the system. Owned by the caller; the model only reads it
/// except during realization.
#[derive(Debug, Clone)]
pub struct State {
    time: f64,
    y: DVector<f64>,
    nq: usize,
    nu: usize,
    constraints: Vec<ConstraintSlot>,
    stage: Stage,
    pub(crate) cache: RealizationCache,
}

impl State {
    pub(crate) fn new(nq: usize, nu: usize, nz: usize, constraints: Vec<ConstraintSlot>) -> Self {
        let ny = nq + nu + nz;
        let nm = constraints
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.equations)
            .sum();
        Self {
            time: 0.0,
            y: DVector::zeros(ny),
            nq,
            nu,
            constraints,
            stage: Stage::Instance,
            cache: RealizationCache::sized(nu, ny, nm),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, t: f64) {
        self.time = t;
        self.invalidate(Stage::Time);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn ny(&self) -> usize {
        self.y.len()
    }

    pub fn nq(&self) -> usize {
        self.nq
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    pub fn nz(&self) -> usize {
        self.y.len() - self.nq - self.nu
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }

    pub fn q(&self) -> &[f64] {
        &self.y.as_slice()[..self.nq]
    }

    pub fn u(&self) -> &[f64] {
        &self.y.as_slice()[self.nq..self.nq + self.nu]
    }

    pub fn z(&self) -> &[f64] {
        &self.y.as_slice()[self.nq + self.nu..]
    }

    /// Replace the whole state vector. Invalidates `Position` onward.
    pub fn set_y(&mut self, y: &DVector<f64>) -> ModelResult<()> {
        if y.len() != self.y.len() {
            return Err(ModelError::ShapeMismatch {
                what: "state vector",
                expected: self.y.len(),
                actual: y.len(),
            });
        }
        self.y.copy_from(y);
        self.invalidate(Stage::Position);
        Ok(())
    }

    pub(crate) fn set_y_entry(&mut self, i: usize, value: f64, invalidates: Stage) {
        self.y[i] = value;
        self.invalidate(invalidates);
    }

    /// Number of Lagrange multipliers of the currently enabled constraints.
    pub fn num_multipliers(&self) -> usize {
        self.constraints
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.equations)
            .sum()
    }

    pub(crate) fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_constraint_enabled(&self, i: usize) -> bool {
        self.constraints.get(i).is_some_and(|c| c.enabled)
    }

    pub(crate) fn set_constraint_enabled(&mut self, i: usize, enabled: bool) {
        if self.constraints[i].enabled == enabled {
            return;
        }
        self.constraints[i].enabled = enabled;
        self.invalidate(Stage::Instance);
        self.cache = RealizationCache::sized(self.nu, self.y.len(), self.num_multipliers());
    }

    /// Explicit derivative `YDot`. Requires `Stage::Acceleration`.
    pub fn ydot(&self) -> ModelResult<&DVector<f64>> {
        self.require(Stage::Acceleration)?;
        Ok(&self.cache.ydot)
    }

    /// Explicit multipliers. Requires `Stage::Acceleration`.
    pub fn multipliers(&self) -> ModelResult<&DVector<f64>> {
        self.require(Stage::Acceleration)?;
        Ok(&self.cache.multipliers)
    }

    /// Requires `Stage::Position`.
    pub fn mass_matrix(&self) -> ModelResult<&DMatrix<f64>> {
        self.require(Stage::Position)?;
        Ok(&self.cache.mass_matrix)
    }

    /// Requires `Stage::Position`.
    pub fn constraint_jacobian(&self) -> ModelResult<&DMatrix<f64>> {
        self.require(Stage::Position)?;
        Ok(&self.cache.constraint_jacobian)
    }

    /// Requires `Stage::Dynamics`.
    pub fn applied_forces(&self) -> ModelResult<&DVector<f64>> {
        self.require(Stage::Dynamics)?;
        Ok(&self.cache.applied_forces)
    }

    pub(crate) fn require(&self, required: Stage) -> ModelResult<()> {
        if self.stage < required {
            return Err(ModelError::StageViolation {
                required,
                actual: self.stage,
            });
        }
        Ok(())
    }

    /// Drop the realized stage below `stage` if it had reached it.
    pub(crate) fn invalidate(&mut self, stage: Stage) {
        if self.stage >= stage {
            self.stage = stage.prev();
        }
    }

    pub(crate) fn mark_realized(&mut self, stage: Stage) {
        self.stage = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State {
        State::new(
            2,
            2,
            1,
            vec![ConstraintSlot {
                equations: 1,
                enabled: true,
            }],
        )
    }

    #[test]
    fn layout_splits_q_u_z() {
        let mut s = state();
        s.set_y(&DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        assert_eq!(s.q(), &[1.0, 2.0]);
        assert_eq!(s.u(), &[3.0, 4.0]);
        assert_eq!(s.z(), &[5.0]);
        assert_eq!(s.nz(), 1);
    }

    #[test]
    fn writes_invalidate_later_stages() {
        let mut s = state();
        s.mark_realized(Stage::Acceleration);
        s.set_y_entry(4, 1.0, Stage::Dynamics);
        assert_eq!(s.stage(), Stage::Velocity);

        s.set_time(0.5);
        assert_eq!(s.stage(), Stage::Instance);

        // Invalidating a stage above the realized one changes nothing.
        s.set_y_entry(4, 2.0, Stage::Dynamics);
        assert_eq!(s.stage(), Stage::Instance);
    }

    #[test]
    fn cache_getters_check_stage() {
        let s = state();
        assert!(matches!(
            s.ydot(),
            Err(ModelError::StageViolation {
                required: Stage::Acceleration,
                ..
            })
        ));
    }

    #[test]
    fn disabling_a_constraint_shrinks_the_multiplier_block() {
        let mut s = state();
        assert_eq!(s.num_multipliers(), 1);
        s.set_constraint_enabled(0, false);
        assert_eq!(s.num_multipliers(), 0);
        assert!(!s.is_constraint_enabled(0));
        assert_eq!(s.cache.constraint_jacobian.nrows(), 0);
    }

    #[test]
    fn set_y_checks_length() {
        let mut s = state();
        let err = s.set_y(&DVector::zeros(3)).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { expected: 5, .. }));
    }
}
