//! Parameter checks shared by the component constructors.

use crate::error::{ComponentError, ComponentResult};
use rd_core::numeric::ensure_finite;

pub(crate) fn check_finite(component: &str, value: f64, what: &'static str) -> ComponentResult<f64> {
    ensure_finite(value, what).map_err(|_| ComponentError::InvalidParameter {
        component: component.to_string(),
        what,
    })?;
    Ok(value)
}

pub(crate) fn check_positive(
    component: &str,
    value: f64,
    what: &'static str,
) -> ComponentResult<f64> {
    check_finite(component, value, what)?;
    if value <= 0.0 {
        return Err(ComponentError::InvalidParameter {
            component: component.to_string(),
            what,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_rejects_zero_and_nan() {
        assert!(check_positive("c", 0.0, "tau").is_err());
        assert!(check_positive("c", f64::NAN, "tau").is_err());
        assert_eq!(check_positive("c", 0.1, "tau"), Ok(0.1));
    }
}
