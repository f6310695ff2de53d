//! Initialization-time validation.
//!
//! Everything here runs while the model is built. Failures surface as
//! `ModelError::Configuration` and never reach residual evaluation.

use std::collections::HashSet;

use crate::error::{ModelError, ModelResult};
use crate::multibody::{Body, JointKind};
use crate::stage::Stage;
use crate::variables::StateVariableDecl;

/// Names are path segments: non-empty and free of `/`.
pub(crate) fn validate_name(context: &str, name: &str) -> ModelResult<()> {
    if name.is_empty() {
        return Err(ModelError::config(context, "empty name"));
    }
    if name.contains('/') {
        return Err(ModelError::config(
            context,
            format!("name '{name}' must not contain '/'"),
        ));
    }
    Ok(())
}

/// Validate one subsystem's flat declaration list against its capabilities.
///
/// `provides_implicit` is whether the subsystem exposes an implicit rule.
pub(crate) fn validate_declarations(
    path: &str,
    decls: &[StateVariableDecl],
    provides_implicit: bool,
) -> ModelResult<()> {
    let mut names = HashSet::new();
    for decl in decls {
        validate_name(path, &decl.name)?;
        if !names.insert(decl.name.as_str()) {
            return Err(ModelError::config(
                path,
                format!("state variable '{}' declared twice", decl.name),
            ));
        }
        if decl.invalidates < Stage::Position || decl.invalidates > Stage::Dynamics {
            return Err(ModelError::config(
                path,
                format!(
                    "state variable '{}' invalidates {:?}; expected Position..=Dynamics",
                    decl.name, decl.invalidates
                ),
            ));
        }
    }

    let implicit = decls.iter().filter(|d| d.has_implicit_form).count();
    if implicit != 0 && implicit != decls.len() {
        let explicit_only: Vec<&str> = decls
            .iter()
            .filter(|d| !d.has_implicit_form)
            .map(|d| d.name.as_str())
            .collect();
        return Err(ModelError::config(
            path,
            format!(
                "implicit form covers {implicit} of {} state variables; missing: {}",
                decls.len(),
                explicit_only.join(", ")
            ),
        ));
    }
    if implicit > 0 && !provides_implicit {
        return Err(ModelError::config(
            path,
            "state variables declare an implicit form but the subsystem provides none",
        ));
    }
    if implicit == 0 && !decls.is_empty() && provides_implicit {
        return Err(ModelError::config(
            path,
            "subsystem provides an implicit form but no state variable declares it",
        ));
    }
    Ok(())
}

pub(crate) fn validate_bodies(bodies: &[Body]) -> ModelResult<()> {
    let mut names = HashSet::new();
    for body in bodies {
        validate_name("bodies", &body.name)?;
        if !names.insert(body.name.as_str()) {
            return Err(ModelError::config(
                "bodies",
                format!("duplicate body '{}'", body.name),
            ));
        }
        let mass = body.mass.value;
        if !(mass.is_finite() && mass > 0.0) {
            return Err(ModelError::config(
                &body.name,
                format!("mass must be positive, got {mass}"),
            ));
        }
        let inertia = body.inertia.value;
        if !(inertia.is_finite() && inertia >= 0.0) {
            return Err(ModelError::config(
                &body.name,
                format!("inertia must be non-negative, got {inertia}"),
            ));
        }
    }
    Ok(())
}

pub(crate) fn validate_joint(
    name: &str,
    kind: &JointKind,
    body_exists: bool,
    coordinate_count: usize,
) -> ModelResult<()> {
    validate_name("joints", name)?;
    if !body_exists {
        return Err(ModelError::config(name, "joint references an unknown body"));
    }
    if coordinate_count != kind.dof() {
        return Err(ModelError::config(
            name,
            format!(
                "{} coordinate name(s) given for a joint with {} degree(s) of freedom",
                coordinate_count,
                kind.dof()
            ),
        ));
    }
    match kind {
        JointKind::Slider { axis } => {
            let n = axis.norm();
            if !(n.is_finite() && n > 0.0) {
                return Err(ModelError::config(name, "slider axis must be non-zero"));
            }
        }
        JointKind::Pin { length } => {
            let l = length.value;
            if !(l.is_finite() && l > 0.0) {
                return Err(ModelError::config(name, "pin length must be positive"));
            }
        }
        JointKind::Translation => {}
    }
    Ok(())
}
