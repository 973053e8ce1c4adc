use thiserror::Error;

/// Errors raised while fitting the regression models
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinRegError {
    /// Two matrices that must agree along one axis do not
    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Which quantity disagreed
        what: &'static str,
        /// The expected extent
        expected: usize,
        /// The actual extent
        got: usize,
    },

    /// The regularized gram matrix could not be inverted
    #[error("regularized gram matrix of size {0} is singular")]
    Singular(usize),

    /// The alpha grid is empty, unordered or contains non positive values
    #[error("invalid alpha grid: {0}")]
    InvalidAlphaGrid(String),
}
