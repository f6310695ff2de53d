//! Damped Newton root-finder with box bounds.

use crate::error::{SolverError, SolverResult};
use nalgebra::{DMatrix, DVector};
use rd_core::numeric::ensure_finite;
use tracing::{debug, warn};

/// Newton solver configuration.
#[derive(Debug, Clone)]
pub struct NewtonConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Absolute tolerance for residual norm
    pub abs_tol: f64,
    /// Relative tolerance for residual norm, against the initial norm
    pub rel_tol: f64,
    /// Line search backtracking factor
    pub line_search_beta: f64,
    /// Maximum line search iterations
    pub max_line_search_iters: usize,
    /// Steps shorter than this (infinity norm) count as stagnation
    pub min_step: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            abs_tol: 1e-10,
            rel_tol: 1e-14,
            line_search_beta: 0.5,
            max_line_search_iters: 30,
            min_step: 1e-14,
        }
    }
}

/// Elementwise box `lower <= x <= upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl Bounds {
    /// `-bound <= x[i] <= bound` for every `i`.
    pub fn symmetric(n: usize, bound: f64) -> Self {
        Self {
            lower: DVector::from_element(n, -bound),
            upper: DVector::from_element(n, bound),
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn contains(&self, x: &DVector<f64>) -> bool {
        x.len() == self.len()
            && x.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(v, (lo, hi))| lo <= v && v <= hi)
    }

    /// Clamp `x` into the box.
    pub fn project(&self, x: &mut DVector<f64>) {
        for (v, (lo, hi)) in x.iter_mut().zip(self.lower.iter().zip(self.upper.iter())) {
            *v = v.clamp(*lo, *hi);
        }
    }
}

/// Newton iteration result. Only produced on convergence.
#[derive(Debug, Clone)]
pub struct NewtonResult {
    /// Solution vector
    pub x: DVector<f64>,
    /// Final residual norm
    pub residual_norm: f64,
    /// Number of iterations
    pub iterations: usize,
}

/// Newton solver with backtracking line search, projected onto `bounds`.
///
/// Converges when `|r| < abs_tol` or `|r| < rel_tol * |r0|`. Anything else
/// ends in [`SolverError::ConvergenceFailed`].
pub fn newton_solve<F, J>(
    x0: DVector<f64>,
    residual_fn: F,
    jacobian_fn: J,
    bounds: Option<&Bounds>,
    config: &NewtonConfig,
) -> SolverResult<NewtonResult>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
    J: Fn(&DVector<f64>) -> SolverResult<DMatrix<f64>>,
{
    if let Some(b) = bounds
        && b.len() != x0.len()
    {
        return Err(SolverError::ProblemSetup {
            what: format!("{} bounds for {} unknowns", b.len(), x0.len()),
        });
    }

    let mut x = x0;
    if let Some(b) = bounds {
        b.project(&mut x);
    }
    let mut r = residual_fn(&x)?;
    let mut r_norm = checked_norm(&r)?;
    let r0_norm = r_norm;

    for iter in 0..config.max_iterations {
        debug!(iter, residual_norm = r_norm, "newton iteration");
        if r_norm < config.abs_tol || r_norm < config.rel_tol * r0_norm {
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
            });
        }

        let jac = jacobian_fn(&x)?;
        let dx = jac.lu().solve(&(-&r)).ok_or_else(|| SolverError::Numeric {
            what: format!("singular Jacobian at iteration {iter}"),
        })?;

        let trial = |alpha: f64| {
            let mut x_new = &x + alpha * &dx;
            if let Some(b) = bounds {
                b.project(&mut x_new);
            }
            x_new
        };

        let mut alpha = 1.0;
        let mut x_new = trial(alpha);
        let mut r_new = residual_fn(&x_new)?;
        let mut r_new_norm = checked_norm(&r_new)?;
        for _ in 0..config.max_line_search_iters {
            if r_new_norm < r_norm {
                break;
            }
            alpha *= config.line_search_beta;
            x_new = trial(alpha);
            r_new = residual_fn(&x_new)?;
            r_new_norm = checked_norm(&r_new)?;
        }

        if r_new_norm >= r_norm || (&x_new - &x).amax() < config.min_step {
            warn!(iter, residual_norm = r_norm, "newton line search stagnated");
            return Err(SolverError::ConvergenceFailed {
                what: format!("line search stagnated at iteration {iter}, residual = {r_norm}"),
            });
        }

        x = x_new;
        r = r_new;
        r_norm = r_new_norm;
    }

    if r_norm < config.abs_tol || r_norm < config.rel_tol * r0_norm {
        return Ok(NewtonResult {
            x,
            residual_norm: r_norm,
            iterations: config.max_iterations,
        });
    }
    warn!(residual_norm = r_norm, "newton iteration limit reached");
    Err(SolverError::ConvergenceFailed {
        what: format!(
            "maximum iterations {} reached, residual = {}",
            config.max_iterations, r_norm
        ),
    })
}

fn checked_norm(r: &DVector<f64>) -> SolverResult<f64> {
    ensure_finite(r.norm(), "residual norm").map_err(|e| SolverError::Numeric {
        what: e.to_string(),
    })
}
