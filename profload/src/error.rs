//! Error types for profload

use thiserror::Error;

/// Library error type.
///
/// Step failures of the workflow ("Profile not created", ...) are *not*
/// errors: they are recorded on the request metric and the run goes on.
/// Only faults that abort an iteration or a run end up here.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid launch configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The HTTP transport failed (connection refused, timeout, ...)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The working profile has no string `id` to address the read, delete
    /// and verify steps with
    #[error("profile has no id: {0}")]
    MissingProfileId(String),

    /// A response body that should have been JSON was not
    #[error("invalid response body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file could not be parsed
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The executor could not coordinate its tasks
    #[error("executor error: {0}")]
    Executor(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
