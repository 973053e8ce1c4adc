use std::path::PathBuf;

use lin_reg::LinRegError;
use thiserror::Error;

/// Convenience alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Structural errors that abort a fold or a whole run.
/// Per channel degeneracies are not errors, they surface as NaN values.
#[derive(Error, Debug)]
pub enum Error {
    /// Two shapes that have to agree do not
    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Which quantity disagreed
        what: String,
        /// The expected extent
        expected: usize,
        /// The actual extent
        got: usize,
    },

    /// A precomputed input, like a fold ordering or a permutation table, is absent
    #[error("missing precomputed artifact: {0}")]
    MissingArtifact(String),

    /// Bin edges are not strictly increasing or could not be fitted
    #[error("invalid bin edges: {0}")]
    InvalidBinEdges(String),

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker finished without reporting the result of its fold
    #[error("fold {0} did not report a result")]
    FoldAborted(usize),

    /// Error raised by the regression routines
    #[error(transparent)]
    LinReg(#[from] LinRegError),

    /// Reading or writing the result store failed
    #[error("io error at {path:?}: {source}")]
    Io {
        /// The file that was accessed
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// (De)serialization failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::ShapeMismatch`]
    pub fn shape(what: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            got,
        }
    }
}
