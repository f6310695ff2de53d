//! First-order muscle activation dynamics.

use rd_model::{
    ImplicitForm, LocalVector, ModelResult, StateDeclarations, Subsystem, SubsystemFrame,
};

use crate::common::{check_finite, check_positive};
use crate::error::{ComponentError, ComponentResult};

/// Activation `a` driven toward a constant excitation `e`: `tau aDot = e - a`.
#[derive(Debug, Clone)]
pub struct FirstOrderActivation {
    name: String,
    /// Time constant (s).
    tau: f64,
    excitation: f64,
    pub default_activation: f64,
}

impl FirstOrderActivation {
    pub fn new(
        name: impl Into<String>,
        tau: f64,
        excitation: f64,
        default_activation: f64,
    ) -> ComponentResult<Self> {
        let name = name.into();
        check_positive(&name, tau, "time constant must be positive")?;
        check_finite(&name, default_activation, "default activation must be finite")?;
        let mut activation = Self {
            name,
            tau,
            excitation: 0.0,
            default_activation,
        };
        activation.set_excitation(excitation)?;
        Ok(activation)
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn excitation(&self) -> f64 {
        self.excitation
    }

    /// Excitation must lie in `[0, 1]`.
    pub fn set_excitation(&mut self, excitation: f64) -> ComponentResult<()> {
        if !(0.0..=1.0).contains(&excitation) {
            return Err(ComponentError::InvalidParameter {
                component: self.name.clone(),
                what: "excitation must lie in [0, 1]",
            });
        }
        self.excitation = excitation;
        Ok(())
    }
}

impl Subsystem for FirstOrderActivation {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_state_variables(&self, decls: &mut StateDeclarations) {
        decls
            .add("activation")
            .implicit()
            .with_default(self.default_activation);
    }

    fn explicit_derivatives(
        &self,
        frame: &SubsystemFrame<'_>,
        derivatives: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        let a = frame.value("activation")?;
        derivatives.set("activation", (self.excitation - a) / self.tau)
    }

    fn implicit_form(&self) -> Option<&dyn ImplicitForm> {
        Some(self)
    }

    fn init_state_from_defaults(&self, values: &mut LocalVector<'_>) -> ModelResult<()> {
        values.set("activation", self.default_activation)
    }

    fn sync_defaults_from_state(&mut self, frame: &SubsystemFrame<'_>) -> ModelResult<()> {
        self.default_activation = frame.value("activation")?;
        Ok(())
    }
}

impl ImplicitForm for FirstOrderActivation {
    fn implicit_residuals(
        &self,
        frame: &SubsystemFrame<'_>,
        derivative_guess: &LocalVector<'_>,
        residuals: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        let a = frame.value("activation")?;
        let adot = derivative_guess.get("activation")?;
        residuals.set("activation", self.tau * adot - (self.excitation - a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excitation_range_is_enforced() {
        assert!(FirstOrderActivation::new("act", 0.01, 1.2, 0.0).is_err());
        let mut act = FirstOrderActivation::new("act", 0.01, 0.5, 0.0).unwrap();
        assert!(act.set_excitation(-0.1).is_err());
        assert_eq!(act.excitation(), 0.5);
    }

    #[test]
    fn time_constant_must_be_positive() {
        assert!(FirstOrderActivation::new("act", 0.0, 0.5, 0.0).is_err());
    }
}
