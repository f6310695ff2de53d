//! rd-model: dynamical subsystems, state indexing, and the implicit residual.
//!
//! A [`Model`] is built once from bodies, joints, constraints, and auxiliary
//! [`Subsystem`]s by a [`ModelBuilder`]. Building validates every subsystem's
//! declarations and assigns each state variable a fixed slot in
//! `Y = [q; u; z]`. After that the model evaluates
//!
//! - the explicit form `YDot = f(Y)` through [`Model::realize`], and
//! - the implicit residual `R(Y, YDotGuess, lambdaGuess)` through
//!   [`Model::calc_residuals`], which is zero exactly at the explicit solution.

pub mod builder;
pub mod constraint;
pub mod error;
pub mod fallback;
pub mod indexing;
pub mod model;
pub mod multibody;
mod residuals;
pub mod stage;
pub mod state;
pub mod subsystem;
mod validate;
pub mod variables;

pub use builder::ModelBuilder;
pub use constraint::{Constraint, CoordinateCoupler, CoordinateTable, CouplerFunction};
pub use error::{ModelError, ModelResult};
pub use fallback::ExplicitFallback;
pub use indexing::{SubsystemEntry, SubsystemKind, SystemIndex};
pub use model::Model;
pub use multibody::{Body, Coordinate, Joint, JointKind, Multibody};
pub use stage::Stage;
pub use state::State;
pub use subsystem::{ImplicitForm, LocalVector, Subsystem, SubsystemFrame};
pub use variables::{StateDeclarations, StateVariable, StateVariableDecl, StateVariableRegistry};
