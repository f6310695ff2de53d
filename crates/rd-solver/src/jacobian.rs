//! Finite difference Jacobian computation.

use crate::error::SolverResult;
use nalgebra::{DMatrix, DVector};
use rd_core::numeric::difference_step;

/// Differencing scheme for numerically differentiated Jacobians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JacobianKind {
    /// One extra residual evaluation per column.
    #[default]
    Forward,
    /// Two extra evaluations per column, second-order accurate.
    Central,
}

/// Jacobian of `f` at `x` by the chosen scheme.
pub fn jacobian<F>(
    kind: JacobianKind,
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    match kind {
        JacobianKind::Forward => finite_difference_jacobian(x, f, epsilon),
        JacobianKind::Central => central_difference_jacobian(x, f, epsilon),
    }
}

/// Forward differences: column j is `(f(x + h e_j) - f(x)) / h`.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let f_x = f(x)?;
    let mut jac = DMatrix::zeros(f_x.len(), x.len());
    let mut probe = x.clone();
    for j in 0..x.len() {
        let h = difference_step(x[j], epsilon);
        probe[j] = x[j] + h;
        let df = (f(&probe)? - &f_x) / h;
        jac.set_column(j, &df);
        probe[j] = x[j];
    }
    Ok(jac)
}

/// Central differences: column j is `(f(x + h e_j) - f(x - h e_j)) / 2h`.
pub fn central_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let m = f(x)?.len();
    let mut jac = DMatrix::zeros(m, x.len());
    let mut probe = x.clone();
    for j in 0..x.len() {
        let h = difference_step(x[j], epsilon);
        probe[j] = x[j] + h;
        let f_plus = f(&probe)?;
        probe[j] = x[j] - h;
        let f_minus = f(&probe)?;
        jac.set_column(j, &((f_plus - f_minus) / (2.0 * h)));
        probe[j] = x[j];
    }
    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(x: &DVector<f64>) -> SolverResult<DVector<f64>> {
        Ok(DVector::from_vec(vec![x[0] * x[0], x[0] * x[1]]))
    }

    #[test]
    fn forward_differences_on_a_linear_map() {
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, 2.0 * x[0]))
        };
        let jac = finite_difference_jacobian(&DVector::from_element(1, 3.0), f, 1e-7).unwrap();
        assert!((jac[(0, 0)] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn central_differences_are_more_accurate() {
        let x = DVector::from_vec(vec![3.0, -2.0]);
        let fwd = jacobian(JacobianKind::Forward, &x, quadratic, 1e-6).unwrap();
        let ctr = jacobian(JacobianKind::Central, &x, quadratic, 1e-6).unwrap();
        let exact = DMatrix::from_row_slice(2, 2, &[6.0, 0.0, -2.0, 3.0]);
        assert!((&ctr - &exact).amax() <= (&fwd - &exact).amax());
        assert!((&ctr - &exact).amax() < 1e-8);
    }
}
