use thiserror::Error;

use nestq_core::error::CompileError;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] nestq_core::error::Error),
}

impl PlanError {
    /// The validation failure, when that is what this is.
    pub fn as_compile(&self) -> Option<&CompileError> {
        match self {
            PlanError::Compile(e) => Some(e),
            _ => None,
        }
    }
}
