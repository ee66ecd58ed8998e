use std::path::{Path, PathBuf};

use hz_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML render error: {0}")]
    TomlRender(#[from] toml::ser::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("record store lock poisoned")]
    LockPoisoned,

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
