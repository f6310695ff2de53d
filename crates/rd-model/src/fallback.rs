//! Generic implicit form for subsystems without a hand-written one.

use crate::error::ModelResult;
use crate::subsystem::{ImplicitForm, LocalVector, Subsystem, SubsystemFrame};

/// Residual `guess - explicit` for every variable of the wrapped subsystem.
///
/// Zero exactly when the guess equals the explicit derivative.
pub struct ExplicitFallback<'a> {
    subsystem: &'a dyn Subsystem,
}

impl<'a> ExplicitFallback<'a> {
    pub fn new(subsystem: &'a dyn Subsystem) -> Self {
        Self { subsystem }
    }
}

impl ImplicitForm for ExplicitFallback<'_> {
    fn implicit_residuals(
        &self,
        frame: &SubsystemFrame<'_>,
        derivative_guess: &LocalVector<'_>,
        residuals: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        let mut explicit = residuals.fresh();
        self.subsystem.explicit_derivatives(frame, &mut explicit)?;
        let explicit = explicit.into_complete("explicit derivatives")?;
        for (i, (&guess, &ydot)) in derivative_guess.as_slice().iter().zip(&explicit).enumerate() {
            residuals.set_local(i, guess - ydot);
        }
        Ok(())
    }
}
