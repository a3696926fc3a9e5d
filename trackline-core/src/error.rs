//! Error types for trackline-core

use thiserror::Error;

/// Main error type for the trackline-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (missing tenant, bad URL, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport error: network failure, timeout or non-2xx response
    #[error("transport error: {0}")]
    Transport(String),

    /// Identity store error
    #[error("identity error: {0}")]
    Identity(String),

    /// No async runtime available for background work
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for trackline-core
pub type Result<T> = std::result::Result<T, Error>;
