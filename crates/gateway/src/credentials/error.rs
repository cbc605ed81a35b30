//! Credential storage error types.

use thiserror::Error;

/// Errors that can occur while reading or writing the renewal credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// IO error from a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),
}
