//! Transport-level errors of the backend client.

use std::path::PathBuf;

use thiserror::Error;

/// Failures that happen before a response envelope could be read.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The request could not be sent or the connection failed.
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with something other than the expected JSON.
    #[error("invalid response from {endpoint} (HTTP {status}): {reason}")]
    InvalidResponse {
        endpoint: String,
        status: u16,
        reason: String,
    },

    /// The document to upload could not be read.
    #[error("failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
