//! `yDot = c y^2`, explicit form only.

use rd_model::{LocalVector, ModelResult, StateDeclarations, Subsystem, SubsystemFrame};

use crate::common::check_finite;
use crate::error::ComponentResult;

#[derive(Debug, Clone)]
pub struct QuadraticDynamics {
    name: String,
    pub coefficient: f64,
    pub default_y: f64,
}

impl QuadraticDynamics {
    pub fn new(name: impl Into<String>, coefficient: f64, default_y: f64) -> ComponentResult<Self> {
        let name = name.into();
        check_finite(&name, coefficient, "coefficient must be finite")?;
        check_finite(&name, default_y, "default value must be finite")?;
        Ok(Self {
            name,
            coefficient,
            default_y,
        })
    }
}

impl Subsystem for QuadraticDynamics {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_state_variables(&self, decls: &mut StateDeclarations) {
        decls.add("y").with_default(self.default_y);
    }

    fn explicit_derivatives(
        &self,
        frame: &SubsystemFrame<'_>,
        derivatives: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        let y = frame.value("y")?;
        derivatives.set("y", self.coefficient * y * y)
    }

    fn init_state_from_defaults(&self, values: &mut LocalVector<'_>) -> ModelResult<()> {
        values.set("y", self.default_y)
    }

    fn sync_defaults_from_state(&mut self, frame: &SubsystemFrame<'_>) -> ModelResult<()> {
        self.default_y = frame.value("y")?;
        Ok(())
    }
}
