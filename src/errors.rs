// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only submission-time and setup problems are errors. What happens to work
//! after it was accepted (stage failure, cancellation, a KEEP submission being
//! ignored) is reported through the status stream instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainworkError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid constraints: please set at least one constraint")]
    InvalidConstraints,

    #[error("Invalid chain '{name}': {reason}")]
    InvalidChain { name: String, reason: String },

    #[error("Engine is not running")]
    EngineStopped,

    #[error("Unknown job or chain: {0}")]
    UnknownWork(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ChainworkError>;
