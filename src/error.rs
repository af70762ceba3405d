//! Error types for the folder_drive crate.

use thiserror::Error;

/// Errors that can occur when interacting with Google Drive.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Not authorized ({0})")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Protocol(String),

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse credentials JSON: {0}")]
    CredentialsParse(#[from] serde_json::Error),

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),
}

impl DriveError {
    /// Whether a chunk request failing with this error may be attempted again.
    pub fn is_transient(&self) -> bool {
        match self {
            DriveError::HttpError(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            DriveError::ApiError { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;

/// Outcome of a remote operation for which "not found" is a valid answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    /// Convert to a `Result`, treating absence as `DriveError::NotFound`.
    pub fn found_or(self, what: impl Into<String>) -> Result<T> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound => Err(DriveError::NotFound(what.into())),
        }
    }
}
