//! Error types for reget core

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in reget core
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Resource changed since the partial download was recorded")]
    StaleRange,

    #[error("Transfer ended early: expected {expected} bytes, received {received}")]
    IncompleteTransfer { expected: u64, received: u64 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl DownloadError {
    /// Errors raised before any transfer is attempted
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            DownloadError::DestinationExists(_) | DownloadError::InvalidUrl(_)
        )
    }
}

impl From<serde_json::Error> for DownloadError {
    fn from(error: serde_json::Error) -> Self {
        DownloadError::Serialization(error.to_string())
    }
}
