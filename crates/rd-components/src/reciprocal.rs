//! `y yDot = c`, with its own implicit form.

use rd_model::{
    ImplicitForm, LocalVector, ModelError, ModelResult, StateDeclarations, Subsystem,
    SubsystemFrame,
};

use crate::common::check_finite;
use crate::error::{ComponentError, ComponentResult};

/// Single variable `y` obeying `y yDot = c`.
///
/// The implicit residual `y yDotGuess - c` is well defined at `y = 0`, where the
/// explicit form `c / y` is not.
#[derive(Debug, Clone)]
pub struct ReciprocalDynamics {
    name: String,
    pub coefficient: f64,
    pub default_y: f64,
}

impl ReciprocalDynamics {
    pub fn new(name: impl Into<String>, coefficient: f64, default_y: f64) -> ComponentResult<Self> {
        let name = name.into();
        check_finite(&name, coefficient, "coefficient must be finite")?;
        check_finite(&name, default_y, "default value must be finite")?;
        if default_y == 0.0 {
            return Err(ComponentError::InvalidParameter {
                component: name,
                what: "default value must be non-zero",
            });
        }
        Ok(Self {
            name,
            coefficient,
            default_y,
        })
    }
}

impl Subsystem for ReciprocalDynamics {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_state_variables(&self, decls: &mut StateDeclarations) {
        decls.add("y").implicit().with_default(self.default_y);
    }

    fn explicit_derivatives(
        &self,
        frame: &SubsystemFrame<'_>,
        derivatives: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        derivatives.set("y", self.coefficient / frame.value("y")?)
    }

    fn implicit_form(&self) -> Option<&dyn ImplicitForm> {
        Some(self)
    }

    fn init_state_from_defaults(&self, values: &mut LocalVector<'_>) -> ModelResult<()> {
        values.set("y", self.default_y)
    }

    fn sync_defaults_from_state(&mut self, frame: &SubsystemFrame<'_>) -> ModelResult<()> {
        let y = frame.value("y")?;
        if y == 0.0 {
            return Err(ModelError::Configuration {
                subsystem: self.name.clone(),
                what: "default value must be non-zero".to_string(),
            });
        }
        self.default_y = y;
        Ok(())
    }
}

impl ImplicitForm for ReciprocalDynamics {
    fn implicit_residuals(
        &self,
        frame: &SubsystemFrame<'_>,
        derivative_guess: &LocalVector<'_>,
        residuals: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        let y = frame.value("y")?;
        residuals.set("y", y * derivative_guess.get("y")? - self.coefficient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_default_is_rejected() {
        assert!(ReciprocalDynamics::new("foo", 0.28, 0.0).is_err());
        assert!(ReciprocalDynamics::new("foo", f64::INFINITY, 1.0).is_err());
    }
}
