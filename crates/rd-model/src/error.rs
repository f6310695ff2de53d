//! Error types for model construction and residual evaluation.

use crate::stage::Stage;
use rd_core::CoreError;
use thiserror::Error;

/// Errors raised while building, realizing, or evaluating a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Raised once, at system initialization, when declarations are inconsistent.
    #[error("Configuration error in '{subsystem}': {what}")]
    Configuration { subsystem: String, what: String },

    /// Raised per call when a caller-supplied vector has the wrong length.
    #[error("Shape mismatch for {what}: expected length {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown state variable: {path}")]
    UnknownVariable { path: String },

    #[error("Unknown subsystem: {path}")]
    UnknownSubsystem { path: String },

    #[error("Subsystem '{subsystem}' did not assign {variable} in {what}")]
    IncompleteContribution {
        subsystem: String,
        variable: String,
        what: &'static str,
    },

    #[error("State realized to {actual:?} but {required:?} is required")]
    StageViolation { required: Stage, actual: Stage },

    #[error("Singular system: {what}")]
    Singular { what: &'static str },

    #[error("Constraint projection failed: {what}")]
    ProjectionFailed { what: String },

    #[error("Non-finite value for {what}: {value}")]
    NonFinite { what: String, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },
}

pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    pub(crate) fn config(subsystem: impl Into<String>, what: impl Into<String>) -> Self {
        ModelError::Configuration {
            subsystem: subsystem.into(),
            what: what.into(),
        }
    }
}

impl From<CoreError> for ModelError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NonFinite { what, value } => ModelError::NonFinite {
                what: what.to_string(),
                value,
            },
            CoreError::NonFiniteAt { what, index, value } => ModelError::NonFinite {
                what: format!("{what}[{index}]"),
                value,
            },
            CoreError::LengthMismatch {
                what,
                expected,
                actual,
            } => ModelError::ShapeMismatch {
                what,
                expected,
                actual,
            },
            other => ModelError::InvalidArg {
                what: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_display() {
        let err = ModelError::ShapeMismatch {
            what: "yDotGuess",
            expected: 2,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("yDotGuess"));
        assert!(msg.contains("expected length 2"));
    }

    #[test]
    fn core_error_conversion() {
        let err: ModelError = CoreError::NonFinite {
            what: "residual",
            value: f64::NAN,
        }
        .into();
        assert!(matches!(err, ModelError::NonFinite { .. }));
    }
}
