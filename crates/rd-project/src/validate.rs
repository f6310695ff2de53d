//! Model document validation.
//!
//! Checks everything that can be decided from the document alone: unique
//! names, resolvable references, and parameter ranges. Declaration and
//! shape consistency of subsystems are checked again by the model builder.

use crate::schema::{ConstraintKindDef, CouplerFunctionDef, JointKindDef, ModelDef, SubsystemDef};
use std::collections::HashSet;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate name: {name} in {context}")]
    DuplicateName { name: String, context: String },

    #[error("Missing reference: {name} in {context}")]
    MissingReference { name: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn unique<'a>(
    seen: &mut HashSet<&'a str>,
    name: &'a str,
    context: &str,
) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(invalid(format!("{context} name"), "\"\"", "must not be empty"));
    }
    if !seen.insert(name) {
        return Err(ValidationError::DuplicateName {
            name: name.to_string(),
            context: context.to_string(),
        });
    }
    Ok(())
}

fn require_finite(field: &str, v: f64) -> Result<(), ValidationError> {
    if !v.is_finite() {
        return Err(invalid(field, v, "must be finite"));
    }
    Ok(())
}

fn require_positive(field: &str, v: f64) -> Result<(), ValidationError> {
    if !(v.is_finite() && v > 0.0) {
        return Err(invalid(field, v, "must be positive"));
    }
    Ok(())
}

pub fn validate_model_def(def: &ModelDef) -> Result<(), ValidationError> {
    if def.version > crate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: def.version,
        });
    }
    if def.name.is_empty() {
        return Err(invalid("model name", "\"\"", "must not be empty"));
    }
    for g in def.gravity {
        require_finite("gravity", g)?;
    }

    let mut bodies = HashSet::new();
    for body in &def.bodies {
        unique(&mut bodies, &body.name, "bodies")?;
        require_positive(&format!("{}.mass_kg", body.name), body.mass_kg)?;
        if !(body.inertia_kgm2.is_finite() && body.inertia_kgm2 >= 0.0) {
            return Err(invalid(
                format!("{}.inertia_kgm2", body.name),
                body.inertia_kgm2,
                "must be non-negative",
            ));
        }
    }

    let mut joints = HashSet::new();
    let mut jointed_bodies = HashSet::new();
    let mut coordinates = HashSet::new();
    for joint in &def.joints {
        unique(&mut joints, &joint.name, "joints")?;
        if !bodies.contains(joint.body.as_str()) {
            return Err(ValidationError::MissingReference {
                name: joint.body.clone(),
                context: format!("joint {} body", joint.name),
            });
        }
        if !jointed_bodies.insert(joint.body.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: joint.body.clone(),
                context: "joint bodies".to_string(),
            });
        }
        match &joint.kind {
            JointKindDef::Slider { axis } => {
                let norm = axis.iter().map(|a| a * a).sum::<f64>().sqrt();
                if !(norm.is_finite() && norm > 0.0) {
                    return Err(invalid(
                        format!("{}.axis", joint.name),
                        format!("{axis:?}"),
                        "must be a non-zero vector",
                    ));
                }
            }
            JointKindDef::Pin { length_m } => {
                require_positive(&format!("{}.length_m", joint.name), *length_m)?;
            }
            JointKindDef::Translation => {}
        }
        if joint.coordinates.len() != joint.kind.dof() {
            return Err(invalid(
                format!("{}.coordinates", joint.name),
                joint.coordinates.len(),
                "must name one coordinate per degree of freedom",
            ));
        }
        for coord in &joint.coordinates {
            unique(&mut coordinates, coord, "coordinates")?;
        }
    }

    let mut defaults = HashSet::new();
    for coord in &def.coordinates {
        if !coordinates.contains(coord.name.as_str()) {
            return Err(ValidationError::MissingReference {
                name: coord.name.clone(),
                context: "coordinate defaults".to_string(),
            });
        }
        unique(&mut defaults, &coord.name, "coordinate defaults")?;
        require_finite(&format!("{}.value", coord.name), coord.value)?;
        require_finite(&format!("{}.speed", coord.name), coord.speed)?;
    }

    let mut constraints = HashSet::new();
    for constraint in &def.constraints {
        unique(&mut constraints, &constraint.name, "constraints")?;
        match &constraint.kind {
            ConstraintKindDef::CoordinateCoupler {
                independent,
                dependent,
                function,
            } => {
                for coord in [independent, dependent] {
                    if !coordinates.contains(coord.as_str()) {
                        return Err(ValidationError::MissingReference {
                            name: coord.clone(),
                            context: format!("constraint {}", constraint.name),
                        });
                    }
                }
                if independent == dependent {
                    return Err(invalid(
                        format!("{}.dependent", constraint.name),
                        dependent,
                        "must differ from the independent coordinate",
                    ));
                }
                let field = format!("{}.function", constraint.name);
                match function {
                    CouplerFunctionDef::Linear { slope, intercept } => {
                        require_finite(&field, *slope)?;
                        require_finite(&field, *intercept)?;
                    }
                    CouplerFunctionDef::Polynomial { coefficients } => {
                        if coefficients.is_empty() {
                            return Err(invalid(field, "[]", "needs at least one coefficient"));
                        }
                        for c in coefficients {
                            require_finite(&field, *c)?;
                        }
                    }
                }
            }
        }
    }

    // Top-level subsystems share a namespace with coordinates.
    let mut top = coordinates.clone();
    for sub in &def.subsystems {
        validate_subsystem(sub, &mut top, &coordinates)?;
    }
    Ok(())
}

fn validate_subsystem<'a>(
    sub: &'a SubsystemDef,
    siblings: &mut HashSet<&'a str>,
    coordinates: &HashSet<&str>,
) -> Result<(), ValidationError> {
    unique(siblings, sub.name(), "subsystems")?;
    let name = sub.name();
    match sub {
        SubsystemDef::Reciprocal {
            coefficient,
            default_y,
            ..
        } => {
            require_finite(&format!("{name}.coefficient"), *coefficient)?;
            if !(default_y.is_finite() && *default_y != 0.0) {
                return Err(invalid(
                    format!("{name}.default_y"),
                    default_y,
                    "must be non-zero",
                ));
            }
        }
        SubsystemDef::Quadratic {
            coefficient,
            default_y,
            ..
        } => {
            require_finite(&format!("{name}.coefficient"), *coefficient)?;
            require_finite(&format!("{name}.default_y"), *default_y)?;
        }
        SubsystemDef::Activation {
            tau_s,
            excitation,
            default_activation,
            ..
        } => {
            require_positive(&format!("{name}.tau_s"), *tau_s)?;
            if !(0.0..=1.0).contains(excitation) {
                return Err(invalid(
                    format!("{name}.excitation"),
                    excitation,
                    "must lie in [0, 1]",
                ));
            }
            require_finite(&format!("{name}.default_activation"), *default_activation)?;
        }
        SubsystemDef::CoordinateFilter {
            coordinate,
            tau_s,
            default_value,
            ..
        } => {
            if !coordinates.contains(coordinate.as_str()) {
                return Err(ValidationError::MissingReference {
                    name: coordinate.clone(),
                    context: format!("subsystem {name}"),
                });
            }
            require_positive(&format!("{name}.tau_s"), *tau_s)?;
            require_finite(&format!("{name}.default_value"), *default_value)?;
        }
        SubsystemDef::Group { children, .. } => {
            let mut nested = HashSet::new();
            for child in children {
                validate_subsystem(child, &mut nested, coordinates)?;
            }
        }
    }
    Ok(())
}
