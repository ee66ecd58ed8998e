use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("vector has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("unknown record: {0}")]
    UnknownRecord(String),

    #[error("invalid factor {factor}: expected {expected}")]
    InvalidFactor { factor: f64, expected: &'static str },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
