//! Implicit derivative solver.
//!
//! Given only the residual operator `R(Y, YDot, lambda)` of a model, recovers the
//! explicit derivative `YDot` and constraint multipliers `lambda` by bounded
//! Newton root-finding on numerically differentiated Jacobians.

pub mod derivative;
pub mod error;
pub mod jacobian;
pub mod newton;
pub mod problem;

pub use derivative::{DerivativeSolution, DerivativeSolver, DerivativeSolverConfig};
pub use error::{SolverError, SolverResult};
pub use jacobian::{JacobianKind, central_difference_jacobian, finite_difference_jacobian};
pub use newton::{Bounds, NewtonConfig, NewtonResult, newton_solve};
pub use problem::ImplicitDerivativeProblem;
