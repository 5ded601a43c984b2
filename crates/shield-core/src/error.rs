//! Error types for Shield

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShieldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Outlier model error: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, ShieldError>;
