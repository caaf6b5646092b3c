//! Error types for Detectar operations.
//!
//! Construction is the only fallible surface in this crate; per-call
//! interfaces treat malformed inputs as caller contract violations.

use std::fmt;

/// Main error type for Detectar operations.
///
/// # Examples
///
/// ```
/// use detectar::error::DetectarError;
///
/// let err = DetectarError::DimensionMismatch {
///     expected: "1470".to_string(),
///     actual: "1280".to_string(),
/// };
/// assert!(err.to_string().contains("dimension mismatch"));
/// ```
#[derive(Debug)]
pub enum DetectarError {
    /// Tensor dimensions don't satisfy the layer's layout identity.
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// Invalid hyperparameter value provided.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },
}

impl fmt::Display for DetectarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectarError::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "Tensor dimension mismatch: expected {expected}, got {actual}"
                )
            }
            DetectarError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid hyperparameter: {param} = {value}, expected {constraint}"
                )
            }
        }
    }
}

impl std::error::Error for DetectarError {}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, DetectarError>;
