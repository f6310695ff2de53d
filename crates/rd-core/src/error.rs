use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures of the numeric helpers shared by every crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Non-finite value for {what}[{index}]: {value}")]
    NonFiniteAt {
        what: &'static str,
        index: usize,
        value: f64,
    },

    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}
