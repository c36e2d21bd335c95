use std::io;

/// All error types for the HLOD batching pipeline.
#[derive(thiserror::Error, Debug)]
pub enum HlodError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Packing error: {0}")]
    Packing(String),
    #[error("Simplification error: {0}")]
    Simplify(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HlodError>;
