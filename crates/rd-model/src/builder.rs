//! Incremental model builder.

use std::collections::HashSet;

use nalgebra::Vector3;
use rd_core::units::{Mass, MomentOfInertia, kgm2};
use rd_core::{BodyId, ConstraintId, CoordId, JointId, constants::G0_MPS2};
use tracing::debug;

use crate::constraint::{Constraint, CoordinateTable};
use crate::error::{ModelError, ModelResult};
use crate::indexing::SystemIndex;
use crate::model::Model;
use crate::multibody::{Body, Coordinate, Joint, JointKind, Multibody};
use crate::subsystem::Subsystem;
use crate::validate;

/// Builder for constructing a model incrementally.
///
/// Add bodies, joints, constraints, and subsystems, then call `build()` to
/// validate everything and assign state indices. All configuration errors are
/// reported by `build()`.
pub struct ModelBuilder {
    name: String,
    gravity: Vector3<f64>,
    bodies: Vec<Body>,
    joints: Vec<Joint>,
    coordinates: Vec<Coordinate>,
    coordinate_defaults: Vec<(String, f64, f64)>,
    constraints: Vec<Box<dyn Constraint>>,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl ModelBuilder {
    /// New builder with gravity `(0, -g0, 0)`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gravity: Vector3::new(0.0, -G0_MPS2, 0.0),
            bodies: Vec::new(),
            joints: Vec::new(),
            coordinates: Vec::new(),
            coordinate_defaults: Vec::new(),
            constraints: Vec::new(),
            subsystems: Vec::new(),
        }
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f64>) -> &mut Self {
        self.gravity = gravity;
        self
    }

    pub fn add_body(&mut self, name: impl Into<String>, mass: Mass) -> BodyId {
        self.add_body_with_inertia(name, mass, kgm2(0.0))
    }

    pub fn add_body_with_inertia(
        &mut self,
        name: impl Into<String>,
        mass: Mass,
        inertia: MomentOfInertia,
    ) -> BodyId {
        let id = BodyId::from_index(self.bodies.len() as u32);
        self.bodies.push(Body {
            id,
            name: name.into(),
            mass,
            inertia,
        });
        id
    }

    /// Attach `body` to ground. One coordinate is created per name, in order.
    pub fn add_joint(
        &mut self,
        name: impl Into<String>,
        body: BodyId,
        kind: JointKind,
        coordinates: &[&str],
    ) -> JointId {
        let id = JointId::from_index(self.joints.len() as u32);
        let mut coords = Vec::with_capacity(coordinates.len());
        for coord_name in coordinates {
            let cid = CoordId::from_index(self.coordinates.len() as u32);
            self.coordinates.push(Coordinate {
                id: cid,
                name: (*coord_name).to_string(),
                joint: id,
                default_value: 0.0,
                default_speed: 0.0,
            });
            coords.push(cid);
        }
        self.joints.push(Joint {
            id,
            name: name.into(),
            body,
            kind,
            coordinates: coords,
        });
        id
    }

    /// Default value and speed of a coordinate. Resolved by `build()`.
    pub fn set_coordinate_default(
        &mut self,
        coordinate: impl Into<String>,
        value: f64,
        speed: f64,
    ) -> &mut Self {
        self.coordinate_defaults
            .push((coordinate.into(), value, speed));
        self
    }

    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) -> ConstraintId {
        let id = ConstraintId::from_index(self.constraints.len() as u32);
        self.constraints.push(constraint);
        id
    }

    pub fn add_subsystem(&mut self, subsystem: Box<dyn Subsystem>) -> &mut Self {
        self.subsystems.push(subsystem);
        self
    }

    /// Validate and freeze into an immutable-topology [`Model`].
    pub fn build(mut self) -> ModelResult<Model> {
        validate::validate_name("model", &self.name)?;
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(ModelError::config(&self.name, "gravity must be finite"));
        }
        validate::validate_bodies(&self.bodies)?;

        let mut joint_names = HashSet::new();
        let mut jointed_bodies = HashSet::new();
        for joint in &mut self.joints {
            let body_exists = joint.body.slot() < self.bodies.len();
            validate::validate_joint(&joint.name, &joint.kind, body_exists, joint.coordinates.len())?;
            if !joint_names.insert(joint.name.clone()) {
                return Err(ModelError::config(
                    "joints",
                    format!("duplicate joint '{}'", joint.name),
                ));
            }
            // Each body hangs from ground by exactly one joint.
            if !jointed_bodies.insert(joint.body) {
                return Err(ModelError::config(
                    &joint.name,
                    format!(
                        "body '{}' already has a joint",
                        self.bodies[joint.body.slot()].name
                    ),
                ));
            }
            if let JointKind::Slider { axis } = &mut joint.kind {
                *axis = axis.normalize();
            }
        }

        let mut coord_names = HashSet::new();
        for coord in &self.coordinates {
            validate::validate_name("coordinates", &coord.name)?;
            if !coord_names.insert(coord.name.as_str()) {
                return Err(ModelError::config(
                    "coordinates",
                    format!("duplicate coordinate '{}'", coord.name),
                ));
            }
        }

        for (name, value, speed) in &self.coordinate_defaults {
            let coord = self
                .coordinates
                .iter_mut()
                .find(|c| &c.name == name)
                .ok_or_else(|| {
                    ModelError::config("coordinates", format!("unknown coordinate '{name}'"))
                })?;
            if !(value.is_finite() && speed.is_finite()) {
                return Err(ModelError::config(name, "default value and speed must be finite"));
            }
            coord.default_value = *value;
            coord.default_speed = *speed;
        }

        let mut constraint_names = HashSet::new();
        let table = CoordinateTable::new(&self.coordinates);
        for constraint in &mut self.constraints {
            let name = constraint.name().to_string();
            validate::validate_name("constraints", &name)?;
            if !constraint_names.insert(name.clone()) {
                return Err(ModelError::config(
                    "constraints",
                    format!("duplicate constraint '{name}'"),
                ));
            }
            if constraint.num_equations() == 0 {
                return Err(ModelError::config(&name, "constraint has no equations"));
            }
            constraint.bind(&table)?;
        }

        let index = SystemIndex::build(&self.coordinates, &self.subsystems)?;

        debug!(
            model = %self.name,
            bodies = self.bodies.len(),
            coordinates = self.coordinates.len(),
            constraints = self.constraints.len(),
            ny = index.ny(),
            "model built"
        );

        Ok(Model::new(
            self.name,
            Multibody {
                gravity: self.gravity,
                bodies: self.bodies,
                joints: self.joints,
                coordinates: self.coordinates,
            },
            self.constraints,
            self.subsystems,
            index,
        ))
    }
}
