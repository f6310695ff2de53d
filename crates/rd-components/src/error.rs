//! Error types for component construction.

use rd_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Invalid parameter for {component}: {what}")]
    InvalidParameter {
        component: String,
        what: &'static str,
    },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}

pub type ComponentResult<T> = Result<T, ComponentError>;

impl From<ComponentError> for ModelError {
    fn from(e: ComponentError) -> Self {
        ModelError::InvalidArg {
            what: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ComponentError::InvalidParameter {
            component: "activ".into(),
            what: "time constant must be positive",
        };
        assert!(err.to_string().contains("activ"));
    }

    #[test]
    fn error_conversion() {
        let err: ModelError = ComponentError::InvalidArg { what: "test" }.into();
        assert!(matches!(err, ModelError::InvalidArg { .. }));
    }
}
