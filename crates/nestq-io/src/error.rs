use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Input that does not fit the declared schema.
    #[error("invalid record at '{path}': {detail}")]
    InvalidRecord { path: String, detail: String },
}
