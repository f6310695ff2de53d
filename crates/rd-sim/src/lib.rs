//! Fixed-step forward simulation of residual-form models.
//!
//! A [`TransientModel`] is stepped by an [`Integrator`] under [`run_sim`].
//! [`ExplicitDynamics`] and [`ImplicitDynamics`] adapt a built
//! [`rd_model::Model`] so the same trajectory can be produced from explicit
//! forward dynamics or from the implicit residual operator.

pub mod dynamics;
pub mod error;
pub mod integrator;
pub mod model;
pub mod sim;

pub use dynamics::{ExplicitDynamics, ImplicitDynamics};
pub use error::{SimError, SimResult};
pub use integrator::{ForwardEuler, Integrator, RK4};
pub use model::TransientModel;
pub use sim::{IntegratorType, SimOptions, SimRecord, run_sim};
