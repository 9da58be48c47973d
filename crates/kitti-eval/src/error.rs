//! Error types for the evaluation library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for evaluation operations.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Main error type for the evaluation library.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A caller passed something the protocol does not accept (unknown metric,
    /// mismatched sample counts, inconsistent array shapes).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading a label, result, or split file failed.
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A label line could not be parsed.
    #[error("{path:?}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Config or result (de)serialisation failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvalError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
