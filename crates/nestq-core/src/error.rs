use thiserror::Error;

use crate::path::FieldPath;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

/// Descriptor validation failures. Raised before any data access and always
/// carrying the offending field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("field type mismatch at '{path}': {detail}")]
    FieldTypeMismatch { path: String, detail: String },

    #[error("aggregate type mismatch at '{path}': {detail}")]
    AggregateTypeMismatch { path: String, detail: String },

    #[error("invalid slice at '{path}': {detail}")]
    InvalidSliceSpec { path: String, detail: String },

    #[error("duplicate flattened field '{field}' at '{path}'")]
    DuplicateFlattenField { path: String, field: String },

    #[error("unknown field path '{path}'")]
    UnknownFieldPath { path: String },

    #[error("duplicate output name '{alias}' at '{path}'")]
    DuplicateAlias { path: String, alias: String },

    #[error("operator '{operator}' is not enabled on '{path}'")]
    OperatorNotEnabled { path: String, operator: String },
}

impl CompileError {
    pub fn unknown(path: &FieldPath) -> Self {
        CompileError::UnknownFieldPath {
            path: path.to_string(),
        }
    }

    /// The offending path, whatever the kind.
    pub fn path(&self) -> &str {
        match self {
            CompileError::FieldTypeMismatch { path, .. }
            | CompileError::AggregateTypeMismatch { path, .. }
            | CompileError::InvalidSliceSpec { path, .. }
            | CompileError::DuplicateFlattenField { path, .. }
            | CompileError::UnknownFieldPath { path }
            | CompileError::DuplicateAlias { path, .. }
            | CompileError::OperatorNotEnabled { path, .. } => path,
        }
    }
}

/// Evaluation failures. Surfaced verbatim; the engine never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    // Adapter output that contradicts the declared schema, or arithmetic that
    // cannot be represented; never silently dropped.
    #[error("invalid data at '{path}': {detail}")]
    InvalidData { path: String, detail: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Hashing error: {0}")]
    Hash(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
