use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("No embedding index at {}; run `build` first", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
