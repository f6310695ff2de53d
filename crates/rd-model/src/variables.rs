//! State variable declarations and the per-subsystem registry.
//!
//! A subsystem declares its variables once, during system initialization, into a
//! flat [`StateDeclarations`] list. Composed subsystems extend the same list, so the
//! combined set is validated as a whole. The resulting [`StateVariableRegistry`]
//! maps each variable name to its local slot and its fixed index in the global
//! state vector `Y`.

use crate::stage::Stage;
use nalgebra::DVector;
use std::collections::HashMap;

/// One declared state variable, before indices are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariableDecl {
    pub name: String,
    /// Writing this variable invalidates this stage and everything after it.
    pub invalidates: Stage,
    pub has_implicit_form: bool,
    pub default_value: f64,
}

impl StateVariableDecl {
    pub fn invalidates(&mut self, stage: Stage) -> &mut Self {
        self.invalidates = stage;
        self
    }

    /// Mark this variable as covered by the subsystem's implicit form.
    pub fn implicit(&mut self) -> &mut Self {
        self.has_implicit_form = true;
        self
    }

    pub fn with_default(&mut self, value: f64) -> &mut Self {
        self.default_value = value;
        self
    }
}

/// Ordered list of declarations built by successive [`add`](Self::add) calls.
#[derive(Debug, Clone, Default)]
pub struct StateDeclarations {
    decls: Vec<StateVariableDecl>,
}

impl StateDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable that invalidates `Stage::Dynamics`, has no implicit form,
    /// and defaults to zero. Chain the returned reference to change any of those.
    pub fn add(&mut self, name: impl Into<String>) -> &mut StateVariableDecl {
        self.decls.push(StateVariableDecl {
            name: name.into(),
            invalidates: Stage::Dynamics,
            has_implicit_form: false,
            default_value: 0.0,
        });
        let last = self.decls.len() - 1;
        &mut self.decls[last]
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn as_slice(&self) -> &[StateVariableDecl] {
        &self.decls
    }

    pub(crate) fn into_vec(self) -> Vec<StateVariableDecl> {
        self.decls
    }
}

/// A state variable after system initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    pub name: String,
    /// Slot within the owning subsystem's local vectors.
    pub local_index: usize,
    /// Slot within the global state vector `Y` (and `YDot`, and the residual).
    pub y_index: usize,
    pub invalidates: Stage,
    pub has_implicit_form: bool,
    pub default_value: f64,
}

/// Name → slot bookkeeping for one subsystem. The layout is fixed once built;
/// only the default values move, through [`Model::sync_defaults_from_state`].
///
/// [`Model::sync_defaults_from_state`]: crate::Model::sync_defaults_from_state
#[derive(Debug, Clone, Default)]
pub struct StateVariableRegistry {
    variables: Vec<StateVariable>,
    by_name: HashMap<String, usize>,
}

impl StateVariableRegistry {
    pub(crate) fn new(variables: Vec<StateVariable>) -> Self {
        let by_name = variables
            .iter()
            .map(|v| (v.name.clone(), v.local_index))
            .collect();
        Self { variables, by_name }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variables(&self) -> &[StateVariable] {
        &self.variables
    }

    pub fn get(&self, name: &str) -> Option<&StateVariable> {
        self.by_name.get(name).map(|&i| &self.variables[i])
    }

    pub fn local_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// True when every variable declares an implicit form (vacuously true when empty).
    pub fn is_fully_implicit(&self) -> bool {
        self.variables.iter().all(|v| v.has_implicit_form)
    }

    /// Copy this subsystem's entries out of a global vector.
    pub fn gather(&self, global: &DVector<f64>) -> Vec<f64> {
        self.variables.iter().map(|v| global[v.y_index]).collect()
    }

    /// Take every default from its slot in `global`.
    pub(crate) fn sync_defaults(&mut self, global: &DVector<f64>) {
        for v in &mut self.variables {
            v.default_value = global[v.y_index];
        }
    }

    /// Write local values into their global slots.
    pub fn scatter(&self, local: &[f64], global: &mut DVector<f64>) {
        for (v, &value) in self.variables.iter().zip(local) {
            global[v.y_index] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StateVariableRegistry {
        StateVariableRegistry::new(vec![
            StateVariable {
                name: "a".into(),
                local_index: 0,
                y_index: 3,
                invalidates: Stage::Dynamics,
                has_implicit_form: true,
                default_value: 1.0,
            },
            StateVariable {
                name: "b".into(),
                local_index: 1,
                y_index: 4,
                invalidates: Stage::Dynamics,
                has_implicit_form: true,
                default_value: 0.0,
            },
        ])
    }

    #[test]
    fn declarations_chain() {
        let mut decls = StateDeclarations::new();
        decls.add("activ").implicit().with_default(0.5);
        decls.add("length").invalidates(Stage::Position);

        let d = decls.as_slice();
        assert_eq!(d.len(), 2);
        assert!(d[0].has_implicit_form);
        assert_eq!(d[0].default_value, 0.5);
        assert_eq!(d[0].invalidates, Stage::Dynamics);
        assert!(!d[1].has_implicit_form);
        assert_eq!(d[1].invalidates, Stage::Position);
    }

    #[test]
    fn lookup_by_name() {
        let reg = registry();
        assert_eq!(reg.local_index("b"), Some(1));
        assert_eq!(reg.get("a").map(|v| v.y_index), Some(3));
        assert!(reg.get("missing").is_none());
        assert!(reg.is_fully_implicit());
    }

    #[test]
    fn gather_and_scatter_use_global_slots() {
        let reg = registry();
        let global = DVector::from_vec(vec![0.0, 0.0, 0.0, 7.0, 8.0]);
        assert_eq!(reg.gather(&global), vec![7.0, 8.0]);

        let mut out = DVector::zeros(5);
        reg.scatter(&[1.5, -2.5], &mut out);
        assert_eq!(out[3], 1.5);
        assert_eq!(out[4], -2.5);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn empty_registry_is_vacuously_implicit() {
        assert!(StateVariableRegistry::default().is_fully_implicit());
    }
}
