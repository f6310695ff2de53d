//! Construction of a [`Model`] from a validated document.

use std::collections::HashMap;

use nalgebra::Vector3;
use rd_components::{
    CoordinateFilter, FirstOrderActivation, QuadraticDynamics, ReciprocalDynamics, SubsystemGroup,
};
use rd_core::BodyId;
use rd_core::units::{kg, kgm2, m};
use rd_model::{CoordinateCoupler, CouplerFunction, JointKind, Model, ModelBuilder, Subsystem};
use tracing::debug;

use crate::ProjectResult;
use crate::schema::{ConstraintKindDef, CouplerFunctionDef, JointKindDef, ModelDef, SubsystemDef};
use crate::validate::{ValidationError, validate_model_def};

/// Validate `def` and build it into a model.
pub fn build_model(def: &ModelDef) -> ProjectResult<Model> {
    validate_model_def(def)?;

    let mut builder = ModelBuilder::new(def.name.clone());
    builder.set_gravity(Vector3::from(def.gravity));

    let mut bodies: HashMap<&str, BodyId> = HashMap::new();
    for body in &def.bodies {
        let id = builder.add_body_with_inertia(
            body.name.clone(),
            kg(body.mass_kg),
            kgm2(body.inertia_kgm2),
        );
        bodies.insert(&body.name, id);
    }

    for joint in &def.joints {
        let body = bodies.get(joint.body.as_str()).copied().ok_or_else(|| {
            ValidationError::MissingReference {
                name: joint.body.clone(),
                context: format!("joint {} body", joint.name),
            }
        })?;
        let kind = match &joint.kind {
            JointKindDef::Slider { axis } => JointKind::slider(Vector3::from(*axis)),
            JointKindDef::Pin { length_m } => JointKind::Pin {
                length: m(*length_m),
            },
            JointKindDef::Translation => JointKind::Translation,
        };
        let names: Vec<&str> = joint.coordinates.iter().map(String::as_str).collect();
        builder.add_joint(joint.name.clone(), body, kind, &names);
    }

    for coord in &def.coordinates {
        builder.set_coordinate_default(coord.name.clone(), coord.value, coord.speed);
    }

    for constraint in &def.constraints {
        match &constraint.kind {
            ConstraintKindDef::CoordinateCoupler {
                independent,
                dependent,
                function,
            } => {
                let function = match function {
                    CouplerFunctionDef::Linear { slope, intercept } => {
                        CouplerFunction::linear(*slope, *intercept)
                    }
                    CouplerFunctionDef::Polynomial { coefficients } => {
                        CouplerFunction::Polynomial {
                            coefficients: coefficients.clone(),
                        }
                    }
                };
                builder.add_constraint(Box::new(CoordinateCoupler::new(
                    constraint.name.clone(),
                    independent.clone(),
                    dependent.clone(),
                    function,
                )));
            }
        }
    }

    for sub in &def.subsystems {
        builder.add_subsystem(build_subsystem(sub)?);
    }

    let model = builder.build()?;
    debug!(model = %def.name, ny = model.ny(), "model document built");
    Ok(model)
}

fn build_subsystem(def: &SubsystemDef) -> ProjectResult<Box<dyn Subsystem>> {
    let sub: Box<dyn Subsystem> = match def {
        SubsystemDef::Reciprocal {
            name,
            coefficient,
            default_y,
        } => Box::new(ReciprocalDynamics::new(name.clone(), *coefficient, *default_y)?),
        SubsystemDef::Quadratic {
            name,
            coefficient,
            default_y,
        } => Box::new(QuadraticDynamics::new(name.clone(), *coefficient, *default_y)?),
        SubsystemDef::Activation {
            name,
            tau_s,
            excitation,
            default_activation,
        } => Box::new(FirstOrderActivation::new(
            name.clone(),
            *tau_s,
            *excitation,
            *default_activation,
        )?),
        SubsystemDef::CoordinateFilter {
            name,
            coordinate,
            tau_s,
            default_value,
        } => Box::new(CoordinateFilter::new(
            name.clone(),
            coordinate.clone(),
            *tau_s,
            *default_value,
        )?),
        SubsystemDef::Group { name, children } => {
            let mut group = SubsystemGroup::new(name.clone());
            for child in children {
                group.add_child(build_subsystem(child)?);
            }
            Box::new(group)
        }
    };
    Ok(sub)
}
