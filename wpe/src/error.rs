//! Error types shared by every WPE stage.

use thiserror::Error;

/// Result type for WPE operations
pub type WpeResult<T> = Result<T, WpeError>;

/// Errors that can occur while configuring or running WPE
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WpeError {
    /// Configuration value or argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Recognised configuration that has no implementation
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Correlation matrix is singular to working precision
    #[error("Singular matrix of size {size}: pivot magnitude {pivot:e} at column {column}")]
    Singular {
        size: usize,
        column: usize,
        pivot: f64,
    },

    /// Array shapes do not line up
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl WpeError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        WpeError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_implemented(msg: impl Into<String>) -> Self {
        WpeError::NotImplemented(msg.into())
    }

    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        WpeError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// True for errors caused by a numerical breakdown rather than misuse.
    pub fn is_numerical(&self) -> bool {
        matches!(self, WpeError::Singular { .. })
    }
}
