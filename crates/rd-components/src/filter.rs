//! Low-pass filter on a generalized coordinate.

use rd_model::{LocalVector, ModelResult, StateDeclarations, Subsystem, SubsystemFrame};

use crate::common::{check_finite, check_positive};
use crate::error::ComponentResult;

/// `yDot = (q - y) / tau`, where `q` is the value of a named coordinate.
///
/// Couples auxiliary state to the multibody state, so its derivative changes
/// whenever the coordinate does.
#[derive(Debug, Clone)]
pub struct CoordinateFilter {
    name: String,
    coordinate: String,
    tau: f64,
    pub default_value: f64,
}

impl CoordinateFilter {
    pub fn new(
        name: impl Into<String>,
        coordinate: impl Into<String>,
        tau: f64,
        default_value: f64,
    ) -> ComponentResult<Self> {
        let name = name.into();
        check_positive(&name, tau, "time constant must be positive")?;
        check_finite(&name, default_value, "default value must be finite")?;
        Ok(Self {
            name,
            coordinate: coordinate.into(),
            tau,
            default_value,
        })
    }

    pub fn coordinate(&self) -> &str {
        &self.coordinate
    }
}

impl Subsystem for CoordinateFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_state_variables(&self, decls: &mut StateDeclarations) {
        decls.add("filtered").with_default(self.default_value);
    }

    fn explicit_derivatives(
        &self,
        frame: &SubsystemFrame<'_>,
        derivatives: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        let q = frame.coordinate_value(&self.coordinate)?;
        let y = frame.value("filtered")?;
        derivatives.set("filtered", (q - y) / self.tau)
    }

    fn init_state_from_defaults(&self, values: &mut LocalVector<'_>) -> ModelResult<()> {
        values.set("filtered", self.default_value)
    }

    fn sync_defaults_from_state(&mut self, frame: &SubsystemFrame<'_>) -> ModelResult<()> {
        self.default_value = frame.value("filtered")?;
        Ok(())
    }
}
