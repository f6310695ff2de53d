//! Stable indexing of every state variable in the system.
//!
//! Built once, in two passes: the first walks coordinates and the subsystem tree
//! collecting (and validating) declarations, the second assigns contiguous `Y`
//! indices. The layout is immutable for the lifetime of the model; only the
//! declared defaults are refreshed when defaults are synced from a state.

use std::collections::HashMap;

use nalgebra::DVector;
use rd_core::CoordId;
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::multibody::Coordinate;
use crate::stage::Stage;
use crate::subsystem::Subsystem;
use crate::validate;
use crate::variables::{StateDeclarations, StateVariable, StateVariableDecl, StateVariableRegistry};

/// What owns an entry's variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemKind {
    /// Multibody coordinate with variables `value` (in q) and `speed` (in u).
    Coordinate(CoordId),
    /// Auxiliary subsystem; `slot` is its position in depth-first order.
    Auxiliary { slot: usize },
}

/// Initialized metadata for one dynamical subsystem.
#[derive(Debug, Clone)]
pub struct SubsystemEntry {
    path: String,
    kind: SubsystemKind,
    parent: Option<usize>,
    registry: StateVariableRegistry,
    implicit_local: bool,
    implicit_subtree: bool,
}

impl SubsystemEntry {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    /// Index of the parent entry, if this subsystem is a child.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn registry(&self) -> &StateVariableRegistry {
        &self.registry
    }

    /// True when this subsystem supplies its own rule for all of its own variables.
    pub fn has_implicit_form_local(&self) -> bool {
        self.implicit_local
    }

    /// True when this subsystem and all of its descendants are locally implicit.
    pub fn has_implicit_form(&self) -> bool {
        self.implicit_subtree
    }
}

/// Index map from variable paths to `Y` slots.
#[derive(Debug, Clone)]
pub struct SystemIndex {
    nq: usize,
    nu: usize,
    nz: usize,
    entries: Vec<SubsystemEntry>,
    entry_by_path: HashMap<String, usize>,
    y_by_path: HashMap<String, usize>,
    /// `Y` index -> variable path.
    labels: Vec<String>,
    /// `Y` index -> stage invalidated by a write.
    invalidates: Vec<Stage>,
    /// Entry indices of auxiliary subsystems in depth-first order.
    auxiliary: Vec<usize>,
}

struct Pending {
    path: String,
    kind: SubsystemKind,
    parent: Option<usize>,
    decls: Vec<StateVariableDecl>,
}

impl SystemIndex {
    pub(crate) fn build(
        coordinates: &[Coordinate],
        subsystems: &[Box<dyn Subsystem>],
    ) -> ModelResult<Self> {
        // Pass 1: enumerate and validate.
        let mut pending = Vec::new();
        for coord in coordinates {
            pending.push(Pending {
                path: coord.name.clone(),
                kind: SubsystemKind::Coordinate(coord.id),
                parent: None,
                decls: coordinate_declarations(coord),
            });
        }
        let mut aux_count = 0;
        collect_auxiliary(subsystems, None, "", &mut aux_count, &mut pending)?;

        // Pass 2: assign global indices.
        let nq = coordinates.len();
        let nu = nq;
        let mut next_z = nq + nu;
        let mut entries = Vec::with_capacity(pending.len());
        let mut entry_by_path = HashMap::new();
        let mut y_by_path = HashMap::new();
        let mut stage_of = HashMap::new();
        let mut auxiliary = Vec::with_capacity(aux_count);

        for (e, p) in pending.into_iter().enumerate() {
            if entry_by_path.insert(p.path.clone(), e).is_some() {
                return Err(ModelError::config(
                    &p.path,
                    "path already used by another subsystem or coordinate",
                ));
            }
            let variables: Vec<StateVariable> = p
                .decls
                .into_iter()
                .enumerate()
                .map(|(local_index, d)| {
                    let y_index = match p.kind {
                        SubsystemKind::Coordinate(id) if local_index == 0 => id.slot(),
                        SubsystemKind::Coordinate(id) => nq + id.slot(),
                        SubsystemKind::Auxiliary { .. } => {
                            next_z += 1;
                            next_z - 1
                        }
                    };
                    StateVariable {
                        name: d.name,
                        local_index,
                        y_index,
                        invalidates: d.invalidates,
                        has_implicit_form: d.has_implicit_form,
                        default_value: d.default_value,
                    }
                })
                .collect();
            for v in &variables {
                y_by_path.insert(format!("{}/{}", p.path, v.name), v.y_index);
                stage_of.insert(v.y_index, v.invalidates);
            }
            if let SubsystemKind::Auxiliary { .. } = p.kind {
                auxiliary.push(e);
            }
            let registry = StateVariableRegistry::new(variables);
            let implicit_local = registry.is_fully_implicit();
            entries.push(SubsystemEntry {
                path: p.path,
                kind: p.kind,
                parent: p.parent,
                registry,
                implicit_local,
                implicit_subtree: implicit_local,
            });
        }

        // Children follow their parent in pre-order, so a reverse sweep folds
        // each subtree into its parent after the subtree itself is final.
        for e in (0..entries.len()).rev() {
            if let Some(parent) = entries[e].parent {
                let child = entries[e].implicit_subtree;
                entries[parent].implicit_subtree &= child;
            }
        }

        let ny = next_z;
        let mut labels = vec![String::new(); ny];
        for (path, &i) in &y_by_path {
            labels[i] = path.clone();
        }
        let invalidates = (0..ny)
            .map(|i| stage_of.get(&i).copied().unwrap_or(Stage::Dynamics))
            .collect();

        debug!(
            nq,
            nz = ny - nq - nu,
            subsystems = entries.len(),
            "state variable indices assigned"
        );

        Ok(Self {
            nq,
            nu,
            nz: ny - nq - nu,
            entries,
            entry_by_path,
            y_by_path,
            labels,
            invalidates,
            auxiliary,
        })
    }

    pub fn ny(&self) -> usize {
        self.nq + self.nu + self.nz
    }

    pub fn nq(&self) -> usize {
        self.nq
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    pub fn entries(&self) -> &[SubsystemEntry] {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> ModelResult<&SubsystemEntry> {
        self.entry_by_path
            .get(path)
            .map(|&e| &self.entries[e])
            .ok_or_else(|| ModelError::UnknownSubsystem {
                path: path.to_string(),
            })
    }

    /// Global index of a variable given its full path (`"foo/activ"`).
    pub fn y_index(&self, path: &str) -> ModelResult<usize> {
        self.y_by_path
            .get(path)
            .copied()
            .ok_or_else(|| ModelError::UnknownVariable {
                path: path.to_string(),
            })
    }

    /// Path of the variable stored at `Y[i]`.
    pub fn label(&self, i: usize) -> Option<&str> {
        self.labels.get(i).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Auxiliary entries in depth-first order.
    pub fn auxiliary_entries(&self) -> impl Iterator<Item = &SubsystemEntry> + '_ {
        self.auxiliary.iter().map(|&e| &self.entries[e])
    }

    pub(crate) fn sync_defaults(&mut self, y: &DVector<f64>) {
        for entry in &mut self.entries {
            entry.registry.sync_defaults(y);
        }
    }

    pub(crate) fn auxiliary_entry(&self, slot: usize) -> &SubsystemEntry {
        &self.entries[self.auxiliary[slot]]
    }

    /// Stage invalidated by writing `Y[i]`.
    pub(crate) fn invalidates(&self, i: usize) -> Stage {
        self.invalidates.get(i).copied().unwrap_or(Stage::Position)
    }
}

fn coordinate_declarations(coord: &Coordinate) -> Vec<StateVariableDecl> {
    let mut decls = StateDeclarations::new();
    decls
        .add("value")
        .invalidates(Stage::Position)
        .implicit()
        .with_default(coord.default_value);
    decls
        .add("speed")
        .invalidates(Stage::Velocity)
        .implicit()
        .with_default(coord.default_speed);
    decls.into_vec()
}

fn collect_auxiliary(
    list: &[Box<dyn Subsystem>],
    parent: Option<usize>,
    prefix: &str,
    aux_count: &mut usize,
    pending: &mut Vec<Pending>,
) -> ModelResult<()> {
    for sub in list {
        let name = sub.name();
        let context = if prefix.is_empty() { "model" } else { prefix };
        validate::validate_name(context, name)?;
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };

        let mut decls = StateDeclarations::new();
        sub.declare_state_variables(&mut decls);
        validate::validate_declarations(&path, decls.as_slice(), sub.implicit_form().is_some())?;

        let me = pending.len();
        pending.push(Pending {
            path: path.clone(),
            kind: SubsystemKind::Auxiliary { slot: *aux_count },
            parent,
            decls: decls.into_vec(),
        });
        *aux_count += 1;
        collect_auxiliary(sub.children(), Some(me), &path, aux_count, pending)?;
    }
    Ok(())
}
