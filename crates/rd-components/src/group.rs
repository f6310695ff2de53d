//! Named container for child subsystems.

use rd_model::{LocalVector, ModelResult, StateDeclarations, Subsystem, SubsystemFrame};

/// Groups children under a common path prefix (`group/child/var`).
/// Owns no state variables.
pub struct SubsystemGroup {
    name: String,
    children: Vec<Box<dyn Subsystem>>,
}

impl SubsystemGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Box<dyn Subsystem>) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: Box<dyn Subsystem>) {
        self.children.push(child);
    }
}

impl Subsystem for SubsystemGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_state_variables(&self, _decls: &mut StateDeclarations) {}

    fn explicit_derivatives(
        &self,
        _frame: &SubsystemFrame<'_>,
        _derivatives: &mut LocalVector<'_>,
    ) -> ModelResult<()> {
        Ok(())
    }

    fn children(&self) -> &[Box<dyn Subsystem>] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut [Box<dyn Subsystem>] {
        &mut self.children
    }
}
