//! Core traits for dynamical subsystems.

use crate::error::{ModelError, ModelResult};
use crate::indexing::{SubsystemEntry, SystemIndex};
use crate::state::State;
use crate::variables::{StateDeclarations, StateVariableRegistry};

/// The extensible unit of auxiliary dynamics (e.g. muscle activation).
///
/// A subsystem declares its state variables once, provides an explicit derivative
/// for each of them, and may additionally expose an [`ImplicitForm`]. Subsystems
/// without one get the generic fallback `guess - explicit` from the model.
///
/// Subsystems are deterministic functions of the state, suitable for evaluation
/// against independent state snapshots from several threads.
pub trait Subsystem: Send + Sync {
    /// Name, unique among siblings. Used as the path segment for variable lookup.
    fn name(&self) -> &str;

    /// Append this subsystem's variables. Called once, when the model is built.
    ///
    /// A subsystem composed from another calls the inner declaration first and
    /// then adds its own variables to the same list.
    fn declare_state_variables(&self, decls: &mut StateDeclarations);

    /// Assign the time derivative of every declared variable.
    fn explicit_derivatives(
        &self,
        frame: &SubsystemFrame<'_>,
        derivatives: &mut LocalVector<'_>,
    ) -> ModelResult<()>;

    /// Capability query: `Some` when the subsystem supplies its own residual rule.
    fn implicit_form(&self) -> Option<&dyn ImplicitForm> {
        None
    }

    /// Overwrite declared defaults with values from the subsystem's own properties.
    ///
    /// `values` arrives holding the declared defaults.
    fn init_state_from_defaults(&self, _values: &mut LocalVector<'_>) -> ModelResult<()> {
        Ok(())
    }

    /// Inverse of [`init_state_from_defaults`](Self::init_state_from_defaults).
    fn sync_defaults_from_state(&mut self, _frame: &SubsystemFrame<'_>) -> ModelResult<()> {
        Ok(())
    }

    /// Owned child subsystems. Must not change after the model is built.
    fn children(&self) -> &[Box<dyn Subsystem>] {
        &[]
    }

    fn children_mut(&mut self) -> &mut [Box<dyn Subsystem>] {
        &mut []
    }
}

/// Hand-written implicit residual rule `R(y, yDotGuess) = 0`.
pub trait ImplicitForm: Send + Sync {
    /// Assign one residual per declared variable.
    fn implicit_residuals(
        &self,
        frame: &SubsystemFrame<'_>,
        derivative_guess: &LocalVector<'_>,
        residuals: &mut LocalVector<'_>,
    ) -> ModelResult<()>;
}

/// Read-only view of the state through one subsystem's registry.
pub struct SubsystemFrame<'a> {
    entry: &'a SubsystemEntry,
    index: &'a SystemIndex,
    state: &'a State,
}

impl<'a> SubsystemFrame<'a> {
    pub(crate) fn new(entry: &'a SubsystemEntry, index: &'a SystemIndex, state: &'a State) -> Self {
        Self {
            entry,
            index,
            state,
        }
    }

    pub fn path(&self) -> &str {
        self.entry.path()
    }

    pub fn time(&self) -> f64 {
        self.state.time()
    }

    /// Value of one of this subsystem's own variables.
    pub fn value(&self, name: &str) -> ModelResult<f64> {
        let var = self
            .entry
            .registry()
            .get(name)
            .ok_or_else(|| ModelError::UnknownVariable {
                path: format!("{}/{}", self.entry.path(), name),
            })?;
        Ok(self.state.y()[var.y_index])
    }

    /// Value of any variable in the system, by full path (`"knee/value"`).
    pub fn state_value(&self, path: &str) -> ModelResult<f64> {
        let i = self.index.y_index(path)?;
        Ok(self.state.y()[i])
    }

    pub fn coordinate_value(&self, coordinate: &str) -> ModelResult<f64> {
        self.state_value(&format!("{coordinate}/value"))
    }

    pub fn coordinate_speed(&self, coordinate: &str) -> ModelResult<f64> {
        self.state_value(&format!("{coordinate}/speed"))
    }
}

/// Per-subsystem vector addressed by variable name.
///
/// Tracks which slots were assigned so that incomplete contributions are caught
/// before they reach the global vector.
#[derive(Debug, Clone)]
pub struct LocalVector<'a> {
    subsystem: &'a str,
    registry: &'a StateVariableRegistry,
    values: Vec<f64>,
    assigned: Vec<bool>,
}

impl<'a> LocalVector<'a> {
    pub(crate) fn unassigned(subsystem: &'a str, registry: &'a StateVariableRegistry) -> Self {
        let n = registry.len();
        Self {
            subsystem,
            registry,
            values: vec![0.0; n],
            assigned: vec![false; n],
        }
    }

    pub(crate) fn from_values(
        subsystem: &'a str,
        registry: &'a StateVariableRegistry,
        values: Vec<f64>,
    ) -> Self {
        let assigned = vec![true; values.len()];
        Self {
            subsystem,
            registry,
            values,
            assigned,
        }
    }

    /// An unassigned vector over the same registry.
    pub(crate) fn fresh(&self) -> LocalVector<'a> {
        Self::unassigned(self.subsystem, self.registry)
    }

    fn slot(&self, name: &str) -> ModelResult<usize> {
        self.registry
            .local_index(name)
            .ok_or_else(|| ModelError::UnknownVariable {
                path: format!("{}/{}", self.subsystem, name),
            })
    }

    pub fn get(&self, name: &str) -> ModelResult<f64> {
        Ok(self.values[self.slot(name)?])
    }

    pub fn set(&mut self, name: &str, value: f64) -> ModelResult<()> {
        let i = self.slot(name)?;
        self.values[i] = value;
        self.assigned[i] = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn set_local(&mut self, i: usize, value: f64) {
        self.values[i] = value;
        self.assigned[i] = true;
    }

    /// Consume the vector, requiring every slot to hold a finite assigned value.
    pub(crate) fn into_complete(self, what: &'static str) -> ModelResult<Vec<f64>> {
        for (var, (&assigned, &value)) in self
            .registry
            .variables()
            .iter()
            .zip(self.assigned.iter().zip(&self.values))
        {
            if !assigned {
                return Err(ModelError::IncompleteContribution {
                    subsystem: self.subsystem.to_string(),
                    variable: var.name.clone(),
                    what,
                });
            }
            if !value.is_finite() {
                return Err(ModelError::NonFinite {
                    what: format!("{}/{} ({})", self.subsystem, var.name, what),
                    value,
                });
            }
        }
        Ok(self.values)
    }
}

/// Depth-first pre-order listing of a subsystem forest.
pub(crate) fn flatten<'a>(list: &'a [Box<dyn Subsystem>], out: &mut Vec<&'a dyn Subsystem>) {
    for sub in list {
        out.push(sub.as_ref());
        flatten(sub.children(), out);
    }
}
