//! Common error types for the deposit services

use thiserror::Error;

use crate::store::StoreError;

/// Common result type for deposit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the deposit crates
#[derive(Error, Debug)]
pub enum Error {
    /// Resource store failure (wraps StoreError)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A resource graph could not be turned into a working model
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
