//! Composite implicit residual `R(Y, YDotGuess, lambdaGuess)`.
//!
//! Layout of the result follows `Y` (q rows, u rows, auxiliary rows) and is
//! followed by one row per multiplier:
//!
//! - `value` rows:  `u - qDotGuess`
//! - `speed` rows:  `M uDotGuess + G^T lambdaGuess - f`
//! - auxiliary rows: the subsystem's implicit form, or `guess - explicit`
//! - multiplier rows: `G uDotGuess + b`

use std::borrow::Cow;

use nalgebra::DVector;

use crate::error::{ModelError, ModelResult};
use crate::fallback::ExplicitFallback;
use crate::indexing::{SubsystemEntry, SubsystemKind};
use crate::model::Model;
use crate::stage::Stage;
use crate::state::State;
use crate::subsystem::{ImplicitForm, LocalVector, Subsystem, SubsystemFrame};

/// Empty input means "all zeros"; any other length must match exactly.
fn normalize<'a>(
    guess: &'a DVector<f64>,
    expected: usize,
    what: &'static str,
) -> ModelResult<Cow<'a, DVector<f64>>> {
    if guess.is_empty() {
        return Ok(Cow::Owned(DVector::zeros(expected)));
    }
    if guess.len() != expected {
        return Err(ModelError::ShapeMismatch {
            what,
            expected,
            actual: guess.len(),
        });
    }
    Ok(Cow::Borrowed(guess))
}

impl Model {
    /// Residual of every state variable followed by the constraint block.
    ///
    /// `state` must already be realized to `Stage::Dynamics`; this call reads the
    /// realization cache and never realizes on its own.
    pub fn calc_residuals(
        &self,
        state: &State,
        ydot_guess: &DVector<f64>,
        lambda_guess: &DVector<f64>,
    ) -> ModelResult<DVector<f64>> {
        let ny = self.ny();
        let nm = state.num_multipliers();
        if state.ny() != ny {
            return Err(ModelError::ShapeMismatch {
                what: "state vector",
                expected: ny,
                actual: state.ny(),
            });
        }
        let ydot = normalize(ydot_guess, ny, "yDotGuess")?;
        let lambda = normalize(lambda_guess, nm, "lambdaGuess")?;
        debug_assert!(
            self.nq() == 0 || state.stage() >= Stage::Dynamics,
            "state realized to {:?} only",
            state.stage()
        );

        let mut residuals = DVector::zeros(ny + nm);
        let (nq, nu) = (self.nq(), self.nu());
        if nu > 0 {
            let cache = &state.cache;
            let udot = ydot.rows(nq, nu).into_owned();
            for (i, &u) in state.u().iter().enumerate() {
                residuals[i] = u - ydot[i];
            }
            let mut speed = &cache.mass_matrix * &udot - &cache.applied_forces;
            if nm > 0 {
                speed += cache.constraint_jacobian.transpose() * &*lambda;
                let accel = &cache.constraint_jacobian * &udot + &cache.acceleration_bias;
                residuals.rows_mut(ny, nm).copy_from(&accel);
            }
            residuals.rows_mut(nq, nu).copy_from(&speed);
        }

        for (sub, entry) in self
            .flat_subsystems()
            .into_iter()
            .zip(self.index().auxiliary_entries())
        {
            let local = self.local_residuals(sub, entry, state, &ydot)?;
            entry.registry().scatter(&local, &mut residuals);
        }
        Ok(residuals)
    }

    fn local_residuals(
        &self,
        sub: &dyn Subsystem,
        entry: &SubsystemEntry,
        state: &State,
        ydot: &DVector<f64>,
    ) -> ModelResult<Vec<f64>> {
        let registry = entry.registry();
        let frame = SubsystemFrame::new(entry, self.index(), state);
        let guess = LocalVector::from_values(entry.path(), registry, registry.gather(ydot));
        let mut out = LocalVector::unassigned(entry.path(), registry);

        let fallback;
        let rule: &dyn ImplicitForm = match sub.implicit_form() {
            Some(form) => form,
            None => {
                fallback = ExplicitFallback::new(sub);
                &fallback
            }
        };
        rule.implicit_residuals(&frame, &guess, &mut out)?;
        out.into_complete("implicit residuals")
    }

    /// Local residuals of one auxiliary subsystem, in declaration order.
    pub fn calc_subsystem_residuals(
        &self,
        state: &State,
        path: &str,
        ydot_guess: &DVector<f64>,
    ) -> ModelResult<Vec<f64>> {
        let entry = self.index().entry(path)?;
        let SubsystemKind::Auxiliary { slot } = entry.kind() else {
            return Err(ModelError::InvalidArg {
                what: format!(
                    "'{path}' is a coordinate; its residuals couple through the mass matrix"
                ),
            });
        };
        let ydot = normalize(ydot_guess, self.ny(), "yDotGuess")?;
        let subs = self.flat_subsystems();
        self.local_residuals(subs[slot], entry, state, &ydot)
    }

    /// Look up one variable's residual in a vector returned by [`calc_residuals`](Self::calc_residuals).
    pub fn residual_by_name(&self, path: &str, residuals: &DVector<f64>) -> ModelResult<f64> {
        let i = self.index().y_index(path)?;
        if residuals.len() < self.ny() {
            return Err(ModelError::ShapeMismatch {
                what: "residuals",
                expected: self.ny(),
                actual: residuals.len(),
            });
        }
        Ok(residuals[i])
    }

    /// Write one variable's entry of a full-length derivative guess.
    pub fn set_derivative_guess(
        &self,
        path: &str,
        value: f64,
        ydot_guess: &mut DVector<f64>,
    ) -> ModelResult<()> {
        let i = self.index().y_index(path)?;
        if ydot_guess.len() != self.ny() {
            return Err(ModelError::ShapeMismatch {
                what: "yDotGuess",
                expected: self.ny(),
                actual: ydot_guess.len(),
            });
        }
        ydot_guess[i] = value;
        Ok(())
    }

    pub fn derivative_guess(&self, path: &str, ydot_guess: &DVector<f64>) -> ModelResult<f64> {
        let i = self.index().y_index(path)?;
        if ydot_guess.len() != self.ny() {
            return Err(ModelError::ShapeMismatch {
                what: "yDotGuess",
                expected: self.ny(),
                actual: ydot_guess.len(),
            });
        }
        Ok(ydot_guess[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_guess_normalizes_to_zeros() {
        let empty = DVector::<f64>::zeros(0);
        let n = normalize(&empty, 3, "yDotGuess").unwrap();
        assert_eq!(&*n, &DVector::<f64>::zeros(3));
        assert!(matches!(n, Cow::Owned(_)));
    }

    #[test]
    fn full_length_guess_is_borrowed() {
        let g = DVector::from_vec(vec![1.0, 2.0]);
        assert!(matches!(normalize(&g, 2, "yDotGuess").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn wrong_length_is_a_shape_mismatch() {
        let g = DVector::from_vec(vec![1.0]);
        assert_eq!(
            normalize(&g, 2, "lambdaGuess").unwrap_err(),
            ModelError::ShapeMismatch {
                what: "lambdaGuess",
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn zero_expected_accepts_empty() {
        let empty = DVector::<f64>::zeros(0);
        assert_eq!(normalize(&empty, 0, "lambdaGuess").unwrap().len(), 0);
    }
}
