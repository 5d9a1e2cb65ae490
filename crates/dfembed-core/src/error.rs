use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input type error: {0}")]
    InputTypeError(String),

    #[error("Embedding failed for row {row} (chunk {chunk}): {message}")]
    EmbeddingFailure { chunk: usize, row: u64, message: String },

    #[error("Dimension mismatch{}: expected {expected}, got {actual}", .row.map(|r| format!(" at row {r}")).unwrap_or_default())]
    DimensionMismatch { expected: usize, actual: usize, row: Option<u64> },

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl Error {
    /// Short, stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "InvalidConfig",
            Error::InputTypeError(_) => "InputTypeError",
            Error::EmbeddingFailure { .. } => "EmbeddingFailure",
            Error::DimensionMismatch { .. } => "DimensionMismatch",
            Error::StorageError(_) => "StorageError",
        }
    }
}

impl From<arrow_schema::ArrowError> for Error {
    fn from(e: arrow_schema::ArrowError) -> Self {
        Error::InputTypeError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
