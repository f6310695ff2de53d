//! Minimal rigid-body dynamics: bodies hung from ground by single joints.
//!
//! Every joint connects one body to ground, so the mass matrix is block diagonal
//! with one block per joint. Applied generalized forces come from uniform gravity.
//! The kinematic differential equation is `qDot = u` for every joint type here.

use nalgebra::{DMatrix, DVector, Vector3};
use rd_core::units::{Length, Mass, MomentOfInertia};
use rd_core::{BodyId, CoordId, JointId};

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: BodyId,
    pub name: String,
    pub mass: Mass,
    /// Centroidal moment of inertia about the joint's rotation axis (pin joints only).
    pub inertia: MomentOfInertia,
}

/// Joint kinds and the mobility they grant their body.
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    /// Translation along a fixed unit axis. One coordinate.
    Slider { axis: Vector3<f64> },
    /// Planar pendulum rotating about ground z. The body's mass center sits at
    /// `length * (sin q, -cos q, 0)`. One coordinate.
    Pin { length: Length },
    /// Free translation along x, y, z. Three coordinates.
    Translation,
}

impl JointKind {
    pub fn slider(axis: Vector3<f64>) -> Self {
        JointKind::Slider { axis }
    }

    pub fn dof(&self) -> usize {
        match self {
            JointKind::Slider { .. } | JointKind::Pin { .. } => 1,
            JointKind::Translation => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub id: JointId,
    pub name: String,
    pub body: BodyId,
    pub kind: JointKind,
    /// Coordinates in mobility order; their `slot()` is their q (and u) index.
    pub coordinates: Vec<CoordId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub id: CoordId,
    pub name: String,
    pub joint: JointId,
    pub default_value: f64,
    pub default_speed: f64,
}

/// The rigid-body part of a model.
#[derive(Debug, Clone)]
pub struct Multibody {
    pub(crate) gravity: Vector3<f64>,
    pub(crate) bodies: Vec<Body>,
    pub(crate) joints: Vec<Joint>,
    pub(crate) coordinates: Vec<Coordinate>,
}

impl Multibody {
    pub fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coordinates.iter().find(|c| c.name == name)
    }

    /// Number of generalized coordinates (equal to the number of speeds).
    pub fn nq(&self) -> usize {
        self.coordinates.len()
    }

    fn body(&self, id: BodyId) -> &Body {
        &self.bodies[id.slot()]
    }

    /// Generalized mass matrix `M(q)`.
    pub fn mass_matrix(&self, q: &[f64]) -> DMatrix<f64> {
        let n = self.nq();
        let mut m = DMatrix::zeros(n, n);
        for joint in &self.joints {
            let body = self.body(joint.body);
            let mass = body.mass.value;
            match &joint.kind {
                JointKind::Slider { .. } | JointKind::Translation => {
                    for c in &joint.coordinates {
                        m[(c.slot(), c.slot())] = mass;
                    }
                }
                JointKind::Pin { length } => {
                    let i = joint.coordinates[0].slot();
                    let l = length.value;
                    m[(i, i)] = mass * l * l + body.inertia.value;
                }
            }
        }
        debug_assert_eq!(q.len(), n);
        m
    }

    /// Applied generalized forces `f(q, u)` from gravity.
    pub fn applied_forces(&self, q: &[f64], _u: &[f64]) -> DVector<f64> {
        let mut f = DVector::zeros(self.nq());
        let g = self.gravity;
        for joint in &self.joints {
            let mass = self.body(joint.body).mass.value;
            match &joint.kind {
                JointKind::Slider { axis } => {
                    f[joint.coordinates[0].slot()] = mass * g.dot(axis);
                }
                JointKind::Translation => {
                    for (k, c) in joint.coordinates.iter().enumerate() {
                        f[c.slot()] = mass * g[k];
                    }
                }
                JointKind::Pin { length } => {
                    // g . d(r_com)/dq with r_com = l (sin q, -cos q, 0).
                    let i = joint.coordinates[0].slot();
                    let l = length.value;
                    f[i] = mass * l * (g.x * q[i].cos() + g.y * q[i].sin());
                }
            }
        }
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rd_core::units::{kg, kgm2, m};
    use rd_core::Id;

    fn pendulum(mass: f64, length: f64, inertia: f64) -> Multibody {
        Multibody {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            bodies: vec![Body {
                id: Id::from_index(0),
                name: "bob".into(),
                mass: kg(mass),
                inertia: kgm2(inertia),
            }],
            joints: vec![Joint {
                id: Id::from_index(0),
                name: "pin".into(),
                body: Id::from_index(0),
                kind: JointKind::Pin { length: m(length) },
                coordinates: vec![Id::from_index(0)],
            }],
            coordinates: vec![Coordinate {
                id: Id::from_index(0),
                name: "theta".into(),
                joint: Id::from_index(0),
                default_value: 0.0,
                default_speed: 0.0,
            }],
        }
    }

    #[test]
    fn pendulum_mass_includes_inertia() {
        let mb = pendulum(2.0, 0.5, 0.1);
        let m = mb.mass_matrix(&[0.3]);
        assert!((m[(0, 0)] - (2.0 * 0.25 + 0.1)).abs() < 1e-14);
    }

    #[test]
    fn pendulum_gravity_restores_toward_bottom() {
        let mb = pendulum(2.0, 0.5, 0.0);
        let f = mb.applied_forces(&[0.3], &[0.0]);
        assert!((f[0] - (-2.0 * 9.81 * 0.5 * 0.3_f64.sin())).abs() < 1e-12);
        assert!(mb.applied_forces(&[0.0], &[0.0])[0].abs() < 1e-15);
    }

    #[test]
    fn slider_force_projects_gravity_on_axis() {
        let mb = Multibody {
            gravity: Vector3::new(-9.81, 0.0, 0.0),
            bodies: vec![Body {
                id: Id::from_index(0),
                name: "ptmass".into(),
                mass: kg(7.2),
                inertia: kgm2(0.0),
            }],
            joints: vec![Joint {
                id: Id::from_index(0),
                name: "slider".into(),
                body: Id::from_index(0),
                kind: JointKind::slider(Vector3::x()),
                coordinates: vec![Id::from_index(0)],
            }],
            coordinates: vec![Coordinate {
                id: Id::from_index(0),
                name: "x".into(),
                joint: Id::from_index(0),
                default_value: 0.0,
                default_speed: 0.0,
            }],
        };
        assert_eq!(mb.mass_matrix(&[0.0])[(0, 0)], 7.2);
        assert!((mb.applied_forces(&[0.0], &[0.0])[0] + 7.2 * 9.81).abs() < 1e-12);
    }
}
