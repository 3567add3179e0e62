use thiserror::Error;

/// Error type shared by every estimator in the workspace.
///
/// Only precondition violations are reported through this type. Numerical
/// degeneracies and non-convergence are handled inside the algorithms.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MlError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Index out of bounds: index {index} for axis {axis} with size {size}")]
    IndexOutOfBounds {
        index: usize,
        axis: usize,
        size: usize,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Empty input: at least one sample with one feature is required")]
    EmptyInput,

    #[error("Length mismatch: {samples} samples but {targets} targets")]
    LengthMismatch { samples: usize, targets: usize },

    #[error("Insufficient samples: {required} required, got {got}")]
    InsufficientSamples { required: usize, got: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Singular matrix: cannot solve the linear system")]
    SingularMatrix,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type MlResult<T> = Result<T, MlError>;
