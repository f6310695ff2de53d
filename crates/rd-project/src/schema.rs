//! Model document schema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub version: u32,
    pub name: String,
    /// Gravity vector in m/s^2.
    #[serde(default = "default_gravity")]
    pub gravity: [f64; 3],
    #[serde(default)]
    pub bodies: Vec<BodyDef>,
    #[serde(default)]
    pub joints: Vec<JointDef>,
    /// Default values and speeds; coordinates not listed start at rest at zero.
    #[serde(default)]
    pub coordinates: Vec<CoordinateDef>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
    #[serde(default)]
    pub subsystems: Vec<SubsystemDef>,
}

fn default_gravity() -> [f64; 3] {
    [0.0, -rd_core::constants::G0_MPS2, 0.0]
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: crate::LATEST_VERSION,
            name: name.into(),
            gravity: default_gravity(),
            bodies: Vec::new(),
            joints: Vec::new(),
            coordinates: Vec::new(),
            constraints: Vec::new(),
            subsystems: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BodyDef {
    pub name: String,
    pub mass_kg: f64,
    #[serde(default)]
    pub inertia_kgm2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JointDef {
    pub name: String,
    pub body: String,
    pub kind: JointKindDef,
    /// One name per degree of freedom.
    pub coordinates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum JointKindDef {
    Slider { axis: [f64; 3] },
    Pin { length_m: f64 },
    Translation,
}

impl JointKindDef {
    pub fn dof(&self) -> usize {
        match self {
            JointKindDef::Slider { .. } | JointKindDef::Pin { .. } => 1,
            JointKindDef::Translation => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinateDef {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintDef {
    pub name: String,
    pub kind: ConstraintKindDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ConstraintKindDef {
    CoordinateCoupler {
        independent: String,
        dependent: String,
        function: CouplerFunctionDef,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CouplerFunctionDef {
    Linear { slope: f64, intercept: f64 },
    Polynomial { coefficients: Vec<f64> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SubsystemDef {
    Reciprocal {
        name: String,
        coefficient: f64,
        default_y: f64,
    },
    Quadratic {
        name: String,
        coefficient: f64,
        default_y: f64,
    },
    Activation {
        name: String,
        tau_s: f64,
        excitation: f64,
        #[serde(default)]
        default_activation: f64,
    },
    CoordinateFilter {
        name: String,
        coordinate: String,
        tau_s: f64,
        #[serde(default)]
        default_value: f64,
    },
    Group {
        name: String,
        #[serde(default)]
        children: Vec<SubsystemDef>,
    },
}

impl SubsystemDef {
    pub fn name(&self) -> &str {
        match self {
            SubsystemDef::Reciprocal { name, .. }
            | SubsystemDef::Quadratic { name, .. }
            | SubsystemDef::Activation { name, .. }
            | SubsystemDef::CoordinateFilter { name, .. }
            | SubsystemDef::Group { name, .. } => name,
        }
    }

    pub fn children(&self) -> &[SubsystemDef] {
        match self {
            SubsystemDef::Group { children, .. } => children,
            _ => &[],
        }
    }
}
