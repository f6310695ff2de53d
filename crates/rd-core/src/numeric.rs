use crate::error::{CoreError, CoreResult};

pub type Real = f64;

/// Absolute and relative tolerance, combined as "either suffices".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Tolerances {
    /// Same bound used absolutely and relatively.
    pub fn uniform(tol: Real) -> Self {
        Self { abs: tol, rel: tol }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

/// `nearly_equal` for every pair; slices of different length never match.
pub fn all_nearly_equal(a: &[Real], b: &[Real], tol: Tolerances) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| nearly_equal(x, y, tol))
}

/// Largest elementwise `|a - b|`.
pub fn max_abs_diff(a: &[Real], b: &[Real], what: &'static str) -> CoreResult<Real> {
    if a.len() != b.len() {
        return Err(CoreError::LengthMismatch {
            what,
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, Real::max))
}

pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// First non-finite entry of `values`, as an error.
pub fn ensure_all_finite(values: &[Real], what: &'static str) -> CoreResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(CoreError::NonFiniteAt {
            what,
            index,
            value: values[index],
        }),
        None => Ok(()),
    }
}

/// Finite difference step for a variable currently at `x`: `epsilon` scaled
/// by `|x|`, never below `epsilon` itself.
pub fn difference_step(x: Real, epsilon: Real) -> Real {
    epsilon * x.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn absolute_or_relative_suffices() {
        let tol = Tolerances::default();
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(nearly_equal(1e6, 1e6 + 1e-4, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn max_abs_diff_checks_lengths() {
        assert_eq!(max_abs_diff(&[1.0, -2.0], &[1.5, -2.25], "x").unwrap(), 0.5);
        assert_eq!(
            max_abs_diff(&[1.0], &[], "x"),
            Err(CoreError::LengthMismatch {
                what: "x",
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn non_finite_entries_are_located() {
        assert!(ensure_all_finite(&[0.0, 1.0], "y").is_ok());
        match ensure_all_finite(&[0.0, f64::INFINITY, f64::NAN], "y") {
            Err(CoreError::NonFiniteAt { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected NonFiniteAt, got {other:?}"),
        }
        assert!(ensure_finite(Real::NAN, "r").is_err());
    }

    #[test]
    fn difference_step_scales_with_magnitude() {
        assert_eq!(difference_step(0.0, 1e-7), 1e-7);
        assert!((difference_step(-300.0, 1e-7) - 3e-5).abs() < 1e-20);
    }

    proptest! {
        #[test]
        fn nearly_equal_is_symmetric(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let tol = Tolerances::default();
            prop_assert_eq!(nearly_equal(a, b, tol), nearly_equal(b, a, tol));
        }
    }
}
