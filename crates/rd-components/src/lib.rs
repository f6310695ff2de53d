//! rd-components: library of auxiliary dynamical subsystems.
//!
//! - `ReciprocalDynamics`: `y yDot = c`, hand-written implicit form
//! - `QuadraticDynamics`: `yDot = c y^2`, explicit only
//! - `FirstOrderActivation`: muscle activation, hand-written implicit form
//! - `CoordinateFilter`: low-pass filter of a coordinate, explicit only
//! - `SubsystemGroup`: nesting
//!
//! Subsystems without an implicit form get the model's generic fallback.

pub mod activation;
mod common;
pub mod error;
pub mod filter;
pub mod group;
pub mod quadratic;
pub mod reciprocal;

pub use activation::FirstOrderActivation;
pub use error::{ComponentError, ComponentResult};
pub use filter::CoordinateFilter;
pub use group::SubsystemGroup;
pub use quadratic::QuadraticDynamics;
pub use reciprocal::ReciprocalDynamics;
