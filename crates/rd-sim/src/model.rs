//! TransientModel trait for pluggable dynamic systems.

use crate::error::SimResult;

/// A system `x_dot = f(t, x)` that can be stepped by an [`Integrator`](crate::Integrator).
///
/// Integrators only combine states through [`add`](Self::add) and
/// [`scale`](Self::scale), so the state type is free to be anything `Clone`.
pub trait TransientModel {
    type State: Clone;

    /// State at `t = 0`.
    fn initial_state(&self) -> SimResult<Self::State>;

    /// Time derivative at `(t, x)`.
    ///
    /// Takes `&mut self` so models can keep a warm start between calls.
    fn rhs(&mut self, t: f64, x: &Self::State) -> SimResult<Self::State>;

    /// `a + b`
    fn add(&self, a: &Self::State, b: &Self::State) -> Self::State;

    /// `scale * a`
    fn scale(&self, a: &Self::State, scale: f64) -> Self::State;
}
