//! CLI error types

use thiserror::Error;

/// CLI error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Detector error: {0}")]
    Spot(#[from] spot_core::SpotError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input in {path}: {reason}")]
    Input { path: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task failed: {0}")]
    Task(String),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
